pub mod config;
pub mod constants;
pub mod dataset;
pub mod db;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod storage;

pub use config::{AwsCredentials, Config, Credentials, ManagedDbConfig, MissingValuePolicy, Preset};
pub use dataset::{ColumnType, Dataset, Value};
pub use error::{EtlError, Phase, Result, RunError};
pub use pipeline::{Pipeline, PipelinePlan, RunReport};
