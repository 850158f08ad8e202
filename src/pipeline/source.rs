//! Source readers: turn a storage location or query into a [`Dataset`].

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::instrument;

use super::report::Reporter;
use crate::dataset::codec::{read_csv, read_csv_bytes};
use crate::dataset::Dataset;
use crate::db::{self, Connection};
use crate::error::{EtlError, Result};
use crate::storage::ObjectStore;

const STAGE: &str = "extract";

pub trait Source {
    fn describe(&self) -> String;
    fn read(&self, reporter: &dyn Reporter) -> Result<Dataset>;
}

/// Wraps any failure as an extraction error that names the source.
fn extraction(source: &dyn Source, err: EtlError) -> EtlError {
    match err {
        EtlError::Extraction(msg) => EtlError::Extraction(msg),
        other => EtlError::Extraction(format!("{}: {other}", source.describe())),
    }
}

/// A CSV object in an object store.
pub struct ObjectStoreSource {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    key: String,
}

impl ObjectStoreSource {
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

impl Source for ObjectStoreSource {
    fn describe(&self) -> String {
        format!("{}/{}/{}", self.store.describe(), self.bucket, self.key)
    }

    #[instrument(skip_all, fields(bucket = %self.bucket, key = %self.key))]
    fn read(&self, reporter: &dyn Reporter) -> Result<Dataset> {
        let bytes = self
            .store
            .get(&self.bucket, &self.key)
            .map_err(|e| extraction(self, e))?;
        let dataset = read_csv_bytes(&bytes).map_err(|e| extraction(self, e))?;
        reporter.info(
            STAGE,
            &format!(
                "Data extracted from object {}/{} ({} rows, {} columns).",
                self.bucket,
                self.key,
                dataset.len(),
                dataset.width()
            ),
        );
        Ok(dataset)
    }
}

/// The result set of a SQL query.
pub struct QuerySource {
    connection: Connection,
    query: String,
}

impl QuerySource {
    pub fn new(connection: Connection, query: impl Into<String>) -> Self {
        Self {
            connection,
            query: query.into(),
        }
    }

    fn run_query(&self) -> Result<Dataset> {
        match &self.connection {
            Connection::Sqlite(target) => {
                let conn = db::open_sqlite(target)?;
                db::query_sqlite(&conn, &self.query)
            }
            Connection::Postgres(url) => {
                let mut client = db::connect_postgres(url)?;
                db::query_postgres(&mut client, &self.query)
            }
            Connection::MySql(url) => {
                let mut conn = db::MySqlServer::from_url(url)?.open(None)?;
                db::query_mysql(&mut conn, &self.query)
            }
        }
    }
}

impl Source for QuerySource {
    fn describe(&self) -> String {
        format!("query on {}", self.connection.describe())
    }

    #[instrument(skip_all, fields(connection = %self.connection.describe()))]
    fn read(&self, reporter: &dyn Reporter) -> Result<Dataset> {
        let dataset = self.run_query().map_err(|e| extraction(self, e))?;
        reporter.info(
            STAGE,
            &format!("Data extracted from database ({} rows).", dataset.len()),
        );
        Ok(dataset)
    }
}

/// A CSV file on local disk.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Source for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn read(&self, reporter: &dyn Reporter) -> Result<Dataset> {
        let file = File::open(&self.path).map_err(|e| extraction(self, e.into()))?;
        let dataset = read_csv(BufReader::new(file)).map_err(|e| extraction(self, e))?;
        reporter.info(
            STAGE,
            &format!(
                "Data extracted from {} ({} rows).",
                self.path.display(),
                dataset.len()
            ),
        );
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::report::RecordingReporter;
    use crate::storage::LocalObjectStore;

    #[test]
    fn object_source_reads_csv_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        crate::storage::ObjectStore::put(&store, "b", "raw.csv", b"Date,Sales\n2024/01/01,10\n")
            .unwrap();

        let source = ObjectStoreSource::new(Arc::new(store), "b", "raw.csv");
        let reporter = RecordingReporter::new();
        let ds = source.read(&reporter).unwrap();

        assert_eq!(ds.columns(), &["Date", "Sales"]);
        assert_eq!(reporter.messages_for(STAGE).len(), 1);
    }

    #[test]
    fn unreachable_object_is_an_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalObjectStore::new(dir.path()));
        let source = ObjectStoreSource::new(store, "b", "nope.csv");
        let err = source.read(&RecordingReporter::new()).unwrap_err();
        assert!(matches!(err, EtlError::Extraction(_)));
    }

    #[test]
    fn malformed_object_is_an_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        crate::storage::ObjectStore::put(&store, "b", "bad.csv", b"a,b\n1,2,3\n").unwrap();
        let source = ObjectStoreSource::new(Arc::new(store), "b", "bad.csv");
        let err = source.read(&RecordingReporter::new()).unwrap_err();
        assert!(matches!(err, EtlError::Extraction(msg) if msg.contains("bad.csv")));
    }

    #[test]
    fn query_source_reads_from_sqlite_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src.db");
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE raw (date TEXT, sales REAL);
             INSERT INTO raw VALUES ('2024/01/01', 10.0), ('2024/01/02', NULL);",
        )
        .unwrap();
        drop(conn);

        let connection = Connection::parse(&format!("sqlite:///{}", path.display())).unwrap();
        let source = QuerySource::new(connection, "SELECT date, sales FROM raw ORDER BY date");
        let ds = source.read(&RecordingReporter::new()).unwrap();
        assert_eq!(ds.len(), 2);
        assert!(ds.rows()[1][1].is_missing());
    }

    #[test]
    fn failing_query_is_an_extraction_error() {
        let connection = Connection::parse("sqlite://").unwrap();
        let source = QuerySource::new(connection, "SELECT * FROM missing");
        let err = source.read(&RecordingReporter::new()).unwrap_err();
        assert!(matches!(err, EtlError::Extraction(_)));
    }
}
