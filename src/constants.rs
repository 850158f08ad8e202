/// Defaults shared by the built-in presets and the binary.
/// These describe the sales dataset the pipeline was built for.

// Source object
pub const DEFAULT_BUCKET: &str = "tungstennn-bucket";
pub const DEFAULT_OBJECT_KEY: &str = "messy_raw_data.csv";
/// Used when neither the config nor the AWS environment names a region.
pub const DEFAULT_S3_REGION: &str = "us-east-1";

// Dataset shape
pub const REQUIRED_COLUMNS: [&str; 4] = ["date", "category", "sales", "region"];
pub const SALES_COLUMN: &str = "sales";
pub const DATE_COLUMN: &str = "date";

/// No single sale in this dataset should exceed this amount; anything above
/// it is treated as a data-entry error.
pub const SALES_OUTLIER_THRESHOLD: f64 = 1500.0;

// Local preset sinks
pub const LOCAL_DATABASE_URL: &str = "sqlite:///my_database.db";
pub const LOCAL_TABLE: &str = "cleaned_data";
pub const LOCAL_CSV_PATH: &str = "cleaned_data.csv";

// Managed preset sink
pub const MANAGED_DATABASE: &str = "sales";
pub const MANAGED_MAINTENANCE_DATABASE: &str = "mysql";
pub const MANAGED_TABLE: &str = "sales_data";
pub const DEFAULT_MYSQL_PORT: u16 = 3306;

// Environment variables read by the binary (never by the pipeline itself)
pub const ENV_DB_HOST: &str = "db_host";
pub const ENV_DB_PORT: &str = "db_port";
pub const ENV_DB_USER: &str = "db_username";
pub const ENV_DB_PASSWORD: &str = "db_password";
pub const ENV_AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const ENV_AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const ENV_AWS_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
