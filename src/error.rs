use std::fmt;

use thiserror::Error;

use crate::dataset::ColumnType;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Missing required columns: {missing:?}")]
    Schema { missing: Vec<String> },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Column '{column}' not found in dataset")]
    UnknownColumn { column: String },

    #[error("Column '{column}' is not numeric; cannot apply {operation}")]
    NonNumeric { column: String, operation: String },

    #[error("Cannot convert value '{value}' in column '{column}' to {target}")]
    TypeCoercion {
        column: String,
        value: String,
        target: ColumnType,
    },

    #[error("Load error: {0}")]
    Load(String),

    #[error("Dataset shape error: {0}")]
    Shape(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] postgres::Error),

    #[error("MySQL error: {0}")]
    MySql(#[from] mysql::Error),
}

pub type Result<T> = std::result::Result<T, EtlError>;

/// The boundary at which a run was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Configuration,
    Extraction,
    Transformation,
    Loading,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Configuration => "configuration",
            Phase::Extraction => "extraction",
            Phase::Transformation => "transformation",
            Phase::Loading => "loading",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Configuration => "Configuration",
            Phase::Extraction => "Extraction",
            Phase::Transformation => "Transformation",
            Phase::Loading => "Loading",
        };
        f.write_str(label)
    }
}

/// A failed run: the phase that aborted it and the underlying cause.
#[derive(Error, Debug)]
#[error("{phase} failed: {source}")]
pub struct RunError {
    pub phase: Phase,
    pub source: EtlError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_lists_every_missing_column() {
        let err = EtlError::Schema {
            missing: vec!["region".to_string(), "sales".to_string()],
        };
        assert_eq!(
            err.to_string(),
            r#"Missing required columns: ["region", "sales"]"#
        );
    }

    #[test]
    fn run_error_names_the_phase() {
        let err = RunError {
            phase: Phase::Transformation,
            source: EtlError::Configuration("unknown missing-value policy 'bogus'".into()),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Transformation failed:"), "got: {msg}");
        assert!(msg.contains("bogus"));
    }

    #[test]
    fn coercion_error_carries_column_and_target() {
        let err = EtlError::TypeCoercion {
            column: "sales".into(),
            value: "abc".into(),
            target: ColumnType::Float,
        };
        assert_eq!(
            err.to_string(),
            "Cannot convert value 'abc' in column 'sales' to float"
        );
    }
}
