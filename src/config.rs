use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::dataset::ColumnType;
use crate::db::Connection;
use crate::error::{EtlError, Result};

/// How missing values in a target column are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MissingValuePolicy {
    Mean,
    Median,
    Mode,
    /// Drop every row with a missing value in the column.
    Remove,
}

impl MissingValuePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            MissingValuePolicy::Mean => "mean",
            MissingValuePolicy::Median => "median",
            MissingValuePolicy::Mode => "mode",
            MissingValuePolicy::Remove => "remove",
        }
    }
}

impl fmt::Display for MissingValuePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MissingValuePolicy {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(MissingValuePolicy::Mean),
            "median" => Ok(MissingValuePolicy::Median),
            "mode" => Ok(MissingValuePolicy::Mode),
            "remove" => Ok(MissingValuePolicy::Remove),
            _ => Err(EtlError::Configuration(format!(
                "invalid missing-value policy '{s}'. Use 'mean', 'median', 'mode' or 'remove'"
            ))),
        }
    }
}

impl TryFrom<String> for MissingValuePolicy {
    type Error = EtlError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<MissingValuePolicy> for String {
    fn from(value: MissingValuePolicy) -> Self {
        value.as_str().to_string()
    }
}

/// Built-in configurations matching the two ways the pipeline is deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// Mean imputation and duplicate removal, loaded into SQLite and a CSV file.
    Local,
    /// Row removal for missing sales, date and outlier cleanup, loaded into
    /// the managed database.
    Managed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default = "default_required_columns")]
    pub required_columns: Vec<String>,
    pub cleaning: CleaningConfig,
    pub sinks: Vec<SinkConfig>,
    #[serde(default)]
    pub object_store: ObjectStoreConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    ObjectStore { bucket: String, key: String },
    Query { connection: String, query: String },
    File { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CleaningConfig {
    pub missing_values: MissingValuesConfig,
    #[serde(default)]
    pub date_delimiter: Option<DelimiterConfig>,
    #[serde(default)]
    pub outliers: Option<OutlierConfig>,
    #[serde(default)]
    pub drop_duplicates: bool,
    /// Column name (after name normalization) to target type.
    #[serde(default)]
    pub column_types: BTreeMap<String, ColumnType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MissingValuesConfig {
    pub policy: MissingValuePolicy,
    /// Columns to treat; every column when absent.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelimiterConfig {
    pub column: String,
    #[serde(default = "default_delimiter_from")]
    pub from: String,
    #[serde(default = "default_delimiter_to")]
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutlierConfig {
    pub column: String,
    /// Rows with a value strictly greater than this are dropped.
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkConfig {
    Database { connection: String, table: String },
    Csv { path: PathBuf },
    ObjectStore { bucket: String, key: String },
    /// The managed MySQL instance; its database is created if absent.
    Managed {
        #[serde(default = "default_managed_table")]
        table: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectStoreConfig {
    /// Amazon S3, or any S3-compatible service when `endpoint` is set.
    S3 {
        #[serde(default)]
        region: Option<String>,
        #[serde(default)]
        endpoint: Option<String>,
    },
    Local { root: PathBuf },
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        ObjectStoreConfig::S3 {
            region: None,
            endpoint: None,
        }
    }
}

fn default_required_columns() -> Vec<String> {
    REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect()
}

fn default_delimiter_from() -> String {
    "/".to_string()
}

fn default_delimiter_to() -> String {
    "-".to_string()
}

fn default_managed_table() -> String {
    MANAGED_TABLE.to_string()
}

impl Config {
    /// Reads and validates a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EtlError::Configuration(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn preset(preset: Preset) -> Self {
        let source = SourceConfig::ObjectStore {
            bucket: DEFAULT_BUCKET.to_string(),
            key: DEFAULT_OBJECT_KEY.to_string(),
        };
        let column_types = BTreeMap::from([(SALES_COLUMN.to_string(), ColumnType::Float)]);

        let (cleaning, sinks) = match preset {
            Preset::Local => (
                CleaningConfig {
                    missing_values: MissingValuesConfig {
                        policy: MissingValuePolicy::Mean,
                        columns: Some(vec![SALES_COLUMN.to_string()]),
                    },
                    date_delimiter: None,
                    outliers: None,
                    drop_duplicates: true,
                    column_types,
                },
                vec![
                    SinkConfig::Database {
                        connection: LOCAL_DATABASE_URL.to_string(),
                        table: LOCAL_TABLE.to_string(),
                    },
                    SinkConfig::Csv {
                        path: PathBuf::from(LOCAL_CSV_PATH),
                    },
                ],
            ),
            Preset::Managed => (
                CleaningConfig {
                    missing_values: MissingValuesConfig {
                        policy: MissingValuePolicy::Remove,
                        columns: Some(vec![SALES_COLUMN.to_string()]),
                    },
                    date_delimiter: Some(DelimiterConfig {
                        column: DATE_COLUMN.to_string(),
                        from: default_delimiter_from(),
                        to: default_delimiter_to(),
                    }),
                    outliers: Some(OutlierConfig {
                        column: SALES_COLUMN.to_string(),
                        max: SALES_OUTLIER_THRESHOLD,
                    }),
                    drop_duplicates: false,
                    column_types,
                },
                vec![SinkConfig::Managed {
                    table: default_managed_table(),
                }],
            ),
        };

        Config {
            source,
            required_columns: default_required_columns(),
            cleaning,
            sinks,
            object_store: ObjectStoreConfig::default(),
        }
    }

    /// Rejects configurations that could never run, before any I/O happens.
    pub fn validate(&self) -> Result<()> {
        if self.sinks.is_empty() {
            return Err(EtlError::Configuration(
                "at least one sink must be configured".to_string(),
            ));
        }

        match &self.source {
            SourceConfig::ObjectStore { bucket, key } => {
                require_non_empty("source bucket", bucket)?;
                require_non_empty("source key", key)?;
            }
            SourceConfig::Query { connection, query } => {
                Connection::parse(connection)?;
                require_non_empty("source query", query)?;
            }
            SourceConfig::File { .. } => {}
        }

        if let Some(columns) = &self.cleaning.missing_values.columns {
            if columns.is_empty() {
                return Err(EtlError::Configuration(
                    "missing_values.columns is empty; omit it to treat every column".to_string(),
                ));
            }
        }

        if let Some(delimiter) = &self.cleaning.date_delimiter {
            require_non_empty("date_delimiter.from", &delimiter.from)?;
        }

        if let Some(outliers) = &self.cleaning.outliers {
            if !outliers.max.is_finite() {
                return Err(EtlError::Configuration(format!(
                    "outlier threshold for '{}' must be finite",
                    outliers.column
                )));
            }
        }

        for sink in &self.sinks {
            match sink {
                SinkConfig::Database { connection, table } => {
                    Connection::parse(connection)?;
                    require_non_empty("sink table", table)?;
                }
                SinkConfig::ObjectStore { bucket, key } => {
                    require_non_empty("sink bucket", bucket)?;
                    require_non_empty("sink key", key)?;
                }
                SinkConfig::Managed { table } => require_non_empty("managed table", table)?,
                SinkConfig::Csv { .. } => {}
            }
        }

        Ok(())
    }

    /// Points the source at a different object, keeping everything else.
    pub fn with_source_object(mut self, bucket: Option<String>, key: Option<String>) -> Self {
        if bucket.is_none() && key.is_none() {
            return self;
        }
        let (current_bucket, current_key) = match &self.source {
            SourceConfig::ObjectStore { bucket, key } => (bucket.clone(), key.clone()),
            _ => (DEFAULT_BUCKET.to_string(), DEFAULT_OBJECT_KEY.to_string()),
        };
        self.source = SourceConfig::ObjectStore {
            bucket: bucket.unwrap_or(current_bucket),
            key: key.unwrap_or(current_key),
        };
        self
    }

    pub fn uses_object_store(&self) -> bool {
        matches!(self.source, SourceConfig::ObjectStore { .. })
            || self
                .sinks
                .iter()
                .any(|s| matches!(s, SinkConfig::ObjectStore { .. }))
    }

    pub fn needs_managed_database(&self) -> bool {
        self.sinks
            .iter()
            .any(|s| matches!(s, SinkConfig::Managed { .. }))
    }
}

fn require_non_empty(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EtlError::Configuration(format!("{what} must not be empty")));
    }
    Ok(())
}

/// Connection details for the managed database sink.
#[derive(Clone)]
pub struct ManagedDbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Database the table is loaded into; created when absent.
    pub database: String,
    /// Database connected to while provisioning `database`.
    pub maintenance_database: String,
}

impl fmt::Debug for ManagedDbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedDbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("maintenance_database", &self.maintenance_database)
            .finish()
    }
}

impl ManagedDbConfig {
    /// Builds the config from a variable lookup (`db_host`, `db_port`,
    /// `db_username`, `db_password`). The port is optional.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| {
                    EtlError::Configuration(format!("environment variable '{name}' is not set"))
                })
        };

        let port = match lookup(ENV_DB_PORT) {
            Some(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| {
                EtlError::Configuration(format!("'{ENV_DB_PORT}' is not a valid port: {raw}"))
            })?,
            _ => DEFAULT_MYSQL_PORT,
        };

        Ok(Self {
            host: required(ENV_DB_HOST)?,
            port,
            user: required(ENV_DB_USER)?,
            password: required(ENV_DB_PASSWORD)?,
            database: MANAGED_DATABASE.to_string(),
            maintenance_database: MANAGED_MAINTENANCE_DATABASE.to_string(),
        })
    }
}

/// Static AWS keys for the S3 object store.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl AwsCredentials {
    /// Reads the standard `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` pair
    /// (and `AWS_SESSION_TOKEN` when present). Returns `None` when neither key
    /// is set, leaving credential discovery to the AWS SDK.
    pub fn from_vars<F>(lookup: F) -> Result<Option<Self>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        match (get(ENV_AWS_ACCESS_KEY_ID), get(ENV_AWS_SECRET_ACCESS_KEY)) {
            (Some(access_key_id), Some(secret_access_key)) => Ok(Some(Self {
                access_key_id,
                secret_access_key,
                session_token: get(ENV_AWS_SESSION_TOKEN),
            })),
            (None, None) => Ok(None),
            (Some(_), None) => Err(EtlError::Configuration(format!(
                "'{ENV_AWS_ACCESS_KEY_ID}' is set but '{ENV_AWS_SECRET_ACCESS_KEY}' is not"
            ))),
            (None, Some(_)) => Err(EtlError::Configuration(format!(
                "'{ENV_AWS_SECRET_ACCESS_KEY}' is set but '{ENV_AWS_ACCESS_KEY_ID}' is not"
            ))),
        }
    }
}

/// Secrets handed to the pipeline by its caller.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub managed_db: Option<ManagedDbConfig>,
    pub aws: Option<AwsCredentials>,
}

impl Credentials {
    /// Collects only the secrets `config` needs from the process environment.
    /// Meant for the binary; library callers construct `Credentials` directly.
    pub fn from_env(config: &Config) -> Result<Self> {
        let lookup = |name: &str| std::env::var(name).ok();
        let managed_db = if config.needs_managed_database() {
            Some(ManagedDbConfig::from_vars(lookup)?)
        } else {
            None
        };
        let aws = if config.uses_object_store() {
            AwsCredentials::from_vars(lookup)?
        } else {
            None
        };
        Ok(Self { managed_db, aws })
    }
}
