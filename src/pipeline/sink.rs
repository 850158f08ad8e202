//! Sink writers. Every sink replaces whatever its destination held before.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::instrument;

use super::report::Reporter;
use crate::config::ManagedDbConfig;
use crate::dataset::codec::{to_csv_bytes, write_csv};
use crate::dataset::Dataset;
use crate::db::{self, Connection, MySqlConnector, MySqlServer};
use crate::error::{EtlError, Result};
use crate::storage::ObjectStore;

const STAGE: &str = "load";

pub trait Sink {
    fn describe(&self) -> String;
    /// Short label used in metrics.
    fn kind(&self) -> &'static str;
    fn write(&self, dataset: &Dataset, reporter: &dyn Reporter) -> Result<()>;
}

/// Wraps any failure as a load error that names the destination.
fn load_error(sink: &dyn Sink, err: EtlError) -> EtlError {
    match err {
        EtlError::Load(msg) => EtlError::Load(msg),
        other => EtlError::Load(format!("{}: {other}", sink.describe())),
    }
}

/// A database table, dropped and recreated.
pub struct DatabaseSink {
    connection: Connection,
    table: String,
}

impl DatabaseSink {
    pub fn new(connection: Connection, table: impl Into<String>) -> Self {
        Self {
            connection,
            table: table.into(),
        }
    }

    fn replace(&self, dataset: &Dataset) -> Result<usize> {
        match &self.connection {
            Connection::Sqlite(target) => {
                let mut conn = db::open_sqlite(target)?;
                db::replace_sqlite_table(&mut conn, &self.table, dataset)
            }
            Connection::Postgres(url) => {
                let mut client = db::connect_postgres(url)?;
                db::replace_postgres_table(&mut client, &self.table, dataset)
            }
            Connection::MySql(url) => {
                let mut session = MySqlServer::from_url(url)?.connect(None)?;
                db::replace_mysql_table(session.as_mut(), &self.table, dataset)
            }
        }
    }
}

impl Sink for DatabaseSink {
    fn describe(&self) -> String {
        format!("table {} on {}", self.table, self.connection.describe())
    }

    fn kind(&self) -> &'static str {
        "database"
    }

    #[instrument(skip_all, fields(table = %self.table))]
    fn write(&self, dataset: &Dataset, reporter: &dyn Reporter) -> Result<()> {
        let rows = self.replace(dataset).map_err(|e| load_error(self, e))?;
        reporter.info(
            STAGE,
            &format!("Loaded {rows} rows to database table: {}", self.table),
        );
        Ok(())
    }
}

/// A CSV file on local disk, header first and no index column.
pub struct CsvFileSink {
    path: PathBuf,
}

impl CsvFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn write_file(&self, dataset: &Dataset) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        // Written beside the target, then renamed into place
        let tmp = self.path.with_extension("csv.tmp");
        let written = File::create(&tmp)
            .map_err(EtlError::from)
            .and_then(|file| write_csv(dataset, BufWriter::new(file)))
            .and_then(|()| fs::rename(&tmp, &self.path).map_err(EtlError::from));
        if written.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        written
    }
}

impl Sink for CsvFileSink {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn kind(&self) -> &'static str {
        "csv"
    }

    fn write(&self, dataset: &Dataset, reporter: &dyn Reporter) -> Result<()> {
        self.write_file(dataset).map_err(|e| load_error(self, e))?;
        reporter.info(
            STAGE,
            &format!("Data saved to CSV file: {}", self.path.display()),
        );
        Ok(())
    }
}

/// A CSV object written back to an object store.
pub struct ObjectStoreSink {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    key: String,
}

impl ObjectStoreSink {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl Sink for ObjectStoreSink {
    fn describe(&self) -> String {
        format!("{}/{}/{}", self.store.describe(), self.bucket, self.key)
    }

    fn kind(&self) -> &'static str {
        "object_store"
    }

    #[instrument(skip_all, fields(bucket = %self.bucket, key = %self.key))]
    fn write(&self, dataset: &Dataset, reporter: &dyn Reporter) -> Result<()> {
        let bytes = to_csv_bytes(dataset).map_err(|e| load_error(self, e))?;
        let digest = hex::encode(Sha256::digest(&bytes));
        self.store
            .put(&self.bucket, &self.key, &bytes)
            .map_err(|e| load_error(self, e))?;
        reporter.info(
            STAGE,
            &format!(
                "Loaded data to bucket: {}, object: {} ({} bytes, sha256 {})",
                self.bucket,
                self.key,
                bytes.len(),
                digest
            ),
        );
        Ok(())
    }
}

/// The managed MySQL instance. The target database is created when absent,
/// then the table is replaced.
pub struct ManagedDatabaseSink {
    config: ManagedDbConfig,
    table: String,
    connector: Box<dyn MySqlConnector>,
}

impl ManagedDatabaseSink {
    pub fn new(config: ManagedDbConfig, table: impl Into<String>) -> Self {
        let connector = Box::new(MySqlServer::managed(&config));
        Self::with_connector(config, table, connector)
    }

    pub fn with_connector(
        config: ManagedDbConfig,
        table: impl Into<String>,
        connector: Box<dyn MySqlConnector>,
    ) -> Self {
        Self {
            config,
            table: table.into(),
            connector,
        }
    }

    fn provision_and_replace(&self, dataset: &Dataset, reporter: &dyn Reporter) -> Result<usize> {
        let (created, rows) =
            db::load_managed(self.connector.as_ref(), &self.config, &self.table, dataset)?;
        if created {
            reporter.info(
                STAGE,
                &format!("Created database '{}'.", self.config.database),
            );
        }
        Ok(rows)
    }
}

impl Sink for ManagedDatabaseSink {
    fn describe(&self) -> String {
        format!(
            "table {} in database {} on {}:{}",
            self.table, self.config.database, self.config.host, self.config.port
        )
    }

    fn kind(&self) -> &'static str {
        "managed"
    }

    #[instrument(skip_all, fields(host = %self.config.host, table = %self.table))]
    fn write(&self, dataset: &Dataset, reporter: &dyn Reporter) -> Result<()> {
        let rows = self
            .provision_and_replace(dataset, reporter)
            .map_err(|e| load_error(self, e))?;
        reporter.info(
            STAGE,
            &format!(
                "Loaded {rows} rows into {}.{}",
                self.config.database, self.table
            ),
        );
        Ok(())
    }
}
