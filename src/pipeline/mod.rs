//! Extract, clean and load, one phase after another.
//!
//! A failure in any phase aborts the run: it is reported once as
//! `"{Phase} failed: {cause}"` and nothing after it runs.

pub mod clean;
pub mod report;
pub mod sink;
pub mod source;
pub mod validate;

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use self::clean::Cleaner;
use self::report::Reporter;
use self::sink::{CsvFileSink, DatabaseSink, ManagedDatabaseSink, ObjectStoreSink, Sink};
use self::source::{FileSource, ObjectStoreSource, QuerySource, Source};
use self::validate::validate_columns;
use crate::config::{Config, Credentials, SinkConfig, SourceConfig};
use crate::dataset::Dataset;
use crate::db::Connection;
use crate::error::{EtlError, Phase, Result, RunError};
use crate::metrics::{time_phase, EtlMetrics};
use crate::storage::{self, ObjectStore};

const STAGE: &str = "pipeline";

/// Summary of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub source: String,
    pub rows_extracted: usize,
    pub rows_loaded: usize,
    pub columns: Vec<String>,
    pub sinks: Vec<String>,
    pub elapsed_ms: u64,
}

/// What a configuration would do, without touching any external system.
#[derive(Debug, Clone, Serialize)]
pub struct PipelinePlan {
    pub source: String,
    pub required_columns: Vec<String>,
    pub steps: Vec<String>,
    pub sinks: Vec<String>,
}

impl PipelinePlan {
    pub fn from_config(config: &Config) -> Self {
        let source = match &config.source {
            SourceConfig::ObjectStore { bucket, key } => format!("object {bucket}/{key}"),
            SourceConfig::Query { connection, .. } => match Connection::parse(connection) {
                Ok(conn) => format!("query on {}", conn.describe()),
                Err(_) => "query".to_string(),
            },
            SourceConfig::File { path } => format!("file {}", path.display()),
        };
        let sinks = config
            .sinks
            .iter()
            .map(|sink| match sink {
                SinkConfig::Database { connection, table } => match Connection::parse(connection) {
                    Ok(conn) => format!("table {table} on {}", conn.describe()),
                    Err(_) => format!("table {table}"),
                },
                SinkConfig::Csv { path } => format!("csv file {}", path.display()),
                SinkConfig::ObjectStore { bucket, key } => format!("object {bucket}/{key}"),
                SinkConfig::Managed { table } => format!("managed database table {table}"),
            })
            .collect();

        Self {
            source,
            required_columns: config.required_columns.clone(),
            steps: Cleaner::from_config(&config.cleaning)
                .steps()
                .iter()
                .map(|s| s.describe())
                .collect(),
            sinks,
        }
    }
}

pub struct Pipeline {
    source: Box<dyn Source>,
    required_columns: Vec<String>,
    cleaner: Cleaner,
    sinks: Vec<Box<dyn Sink>>,
}

impl Pipeline {
    pub fn new(
        source: Box<dyn Source>,
        required_columns: Vec<String>,
        cleaner: Cleaner,
        sinks: Vec<Box<dyn Sink>>,
    ) -> Self {
        Self {
            source,
            required_columns,
            cleaner,
            sinks,
        }
    }

    /// Builds the source, cleaner and sinks `config` describes. Nothing is
    /// connected to until the pipeline runs.
    pub fn from_config(config: &Config, credentials: &Credentials) -> Result<Self> {
        config.validate()?;

        let store: Option<Arc<dyn ObjectStore>> = if config.uses_object_store() {
            Some(storage::from_config(
                &config.object_store,
                credentials.aws.clone(),
            )?)
        } else {
            None
        };
        let store_for = |what: &str| {
            store.clone().ok_or_else(|| {
                EtlError::Configuration(format!("no object store configured for {what}"))
            })
        };

        let source: Box<dyn Source> = match &config.source {
            SourceConfig::ObjectStore { bucket, key } => Box::new(ObjectStoreSource::new(
                store_for("the source")?,
                bucket.clone(),
                key.clone(),
            )),
            SourceConfig::Query { connection, query } => Box::new(QuerySource::new(
                Connection::parse(connection)?,
                query.clone(),
            )),
            SourceConfig::File { path } => Box::new(FileSource::new(path.clone())),
        };

        let mut sinks: Vec<Box<dyn Sink>> = Vec::with_capacity(config.sinks.len());
        for sink in &config.sinks {
            let built: Box<dyn Sink> = match sink {
                SinkConfig::Database { connection, table } => {
                    Box::new(DatabaseSink::new(Connection::parse(connection)?, table.clone()))
                }
                SinkConfig::Csv { path } => Box::new(CsvFileSink::new(path.clone())),
                SinkConfig::ObjectStore { bucket, key } => Box::new(ObjectStoreSink::new(
                    store_for("a sink")?,
                    bucket.clone(),
                    key.clone(),
                )),
                SinkConfig::Managed { table } => {
                    let managed = credentials.managed_db.clone().ok_or_else(|| {
                        EtlError::Configuration(
                            "managed database sink configured without database credentials"
                                .to_string(),
                        )
                    })?;
                    Box::new(ManagedDatabaseSink::new(managed, table.clone()))
                }
            };
            sinks.push(built);
        }

        Ok(Self::new(
            source,
            config.required_columns.clone(),
            Cleaner::from_config(&config.cleaning),
            sinks,
        ))
    }

    /// Validates the schema, then cleans.
    pub fn transform(&self, dataset: Dataset, reporter: &dyn Reporter) -> Result<Dataset> {
        validate_columns(&dataset, &self.required_columns)?;
        reporter.info("validate", "Validated required columns.");
        self.cleaner.clean(dataset, reporter)
    }

    #[instrument(skip_all, fields(source = %self.source.describe()))]
    pub fn run(&self, reporter: &dyn Reporter) -> std::result::Result<RunReport, RunError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();

        let dataset = run_phase(Phase::Extraction, reporter, || self.source.read(reporter))?;
        let rows_extracted = dataset.len();
        EtlMetrics::record_rows_extracted(rows_extracted);

        let cleaned = run_phase(Phase::Transformation, reporter, || {
            self.transform(dataset, reporter)
        })?;

        let mut written = Vec::with_capacity(self.sinks.len());
        run_phase(Phase::Loading, reporter, || {
            for sink in &self.sinks {
                sink.write(&cleaned, reporter)?;
                EtlMetrics::record_rows_loaded(sink.kind(), cleaned.len());
                written.push(sink.describe());
            }
            Ok(())
        })?;

        EtlMetrics::record_run_succeeded();
        reporter.info(STAGE, "ETL pipeline completed successfully.");

        Ok(RunReport {
            run_id,
            started_at,
            source: self.source.describe(),
            rows_extracted,
            rows_loaded: cleaned.len(),
            columns: cleaned.columns().to_vec(),
            sinks: written,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Runs one phase, timing it and reporting its failure.
pub fn run_phase<T>(
    phase: Phase,
    reporter: &dyn Reporter,
    body: impl FnOnce() -> Result<T>,
) -> std::result::Result<T, RunError> {
    let _timer = time_phase(phase);
    body().map_err(|source| {
        let err = RunError { phase, source };
        reporter.error(STAGE, &err.to_string());
        EtlMetrics::record_run_failed(phase);
        err
    })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::config::Preset;
    use crate::dataset::test_support::text_dataset;
    use crate::pipeline::report::{Level, RecordingReporter};

    struct FixedSource(Dataset);

    impl Source for FixedSource {
        fn describe(&self) -> String {
            "fixed".to_string()
        }

        fn read(&self, _reporter: &dyn Reporter) -> Result<Dataset> {
            Ok(self.0.clone())
        }
    }

    struct FailingSource;

    impl Source for FailingSource {
        fn describe(&self) -> String {
            "unreachable".to_string()
        }

        fn read(&self, _reporter: &dyn Reporter) -> Result<Dataset> {
            Err(EtlError::Extraction("connection refused".to_string()))
        }
    }

    /// Keeps every dataset it is handed.
    #[derive(Clone, Default)]
    struct MemorySink {
        written: Rc<RefCell<Vec<Dataset>>>,
        fail: bool,
    }

    impl Sink for MemorySink {
        fn describe(&self) -> String {
            "memory".to_string()
        }

        fn kind(&self) -> &'static str {
            "memory"
        }

        fn write(&self, dataset: &Dataset, _reporter: &dyn Reporter) -> Result<()> {
            if self.fail {
                return Err(EtlError::Load("disk full".to_string()));
            }
            self.written.borrow_mut().push(dataset.clone());
            Ok(())
        }
    }

    fn raw() -> Dataset {
        text_dataset(
            &["date", "category", "sales", "region"],
            &[
                &["2024/01/01", "Books", "10", "North"],
                &["2024/01/02", "Toys", "", "South"],
                &["2024/01/03", "Games", "20", "East"],
            ],
        )
    }

    fn pipeline(source: Box<dyn Source>, preset: Preset, sinks: Vec<Box<dyn Sink>>) -> Pipeline {
        let config = Config::preset(preset);
        Pipeline::new(
            source,
            config.required_columns.clone(),
            Cleaner::from_config(&config.cleaning),
            sinks,
        )
    }

    #[test]
    fn successful_run_loads_every_sink_and_reports() {
        let first = MemorySink::default();
        let second = MemorySink::default();
        let p = pipeline(
            Box::new(FixedSource(raw())),
            Preset::Local,
            vec![Box::new(first.clone()), Box::new(second.clone())],
        );
        let reporter = RecordingReporter::new();

        let report = p.run(&reporter).unwrap();

        assert_eq!(report.rows_extracted, 3);
        assert_eq!(report.rows_loaded, 3);
        assert_eq!(report.sinks, vec!["memory", "memory"]);
        assert_eq!(first.written.borrow().len(), 1);
        assert_eq!(second.written.borrow().len(), 1);
        assert!(reporter.has(Level::Info, "ETL pipeline completed successfully."));
    }

    #[test]
    fn extraction_failure_stops_before_loading() {
        let sink = MemorySink::default();
        let p = pipeline(Box::new(FailingSource), Preset::Local, vec![Box::new(sink.clone())]);
        let reporter = RecordingReporter::new();

        let err = p.run(&reporter).unwrap_err();

        assert_eq!(err.phase, Phase::Extraction);
        assert!(sink.written.borrow().is_empty());
        assert!(reporter.has(Level::Error, "Extraction failed: "));
    }

    #[test]
    fn schema_failure_is_a_transformation_failure() {
        let ds = text_dataset(&["date", "category", "sales"], &[&["2024/01/01", "Books", "10"]]);
        let sink = MemorySink::default();
        let p = pipeline(Box::new(FixedSource(ds)), Preset::Local, vec![Box::new(sink.clone())]);
        let reporter = RecordingReporter::new();

        let err = p.run(&reporter).unwrap_err();

        assert_eq!(err.phase, Phase::Transformation);
        assert!(matches!(&err.source, EtlError::Schema { missing } if missing == &["region"]));
        assert!(sink.written.borrow().is_empty());
        assert!(!reporter.has(Level::Info, "completed successfully"));
    }

    #[test]
    fn coercion_failure_prevents_any_load() {
        let ds = text_dataset(
            &["date", "category", "sales", "region"],
            &[&["2024/01/01", "Books", "ten", "North"]],
        );
        let sink = MemorySink::default();
        let mut config = Config::preset(Preset::Local);
        config.cleaning.missing_values.columns = Some(vec!["region".into()]);
        config.cleaning.missing_values.policy = crate::config::MissingValuePolicy::Mode;
        let p = Pipeline::new(
            Box::new(FixedSource(ds)),
            config.required_columns.clone(),
            Cleaner::from_config(&config.cleaning),
            vec![Box::new(sink.clone())],
        );

        let err = p.run(&RecordingReporter::new()).unwrap_err();

        assert_eq!(err.phase, Phase::Transformation);
        assert!(matches!(err.source, EtlError::TypeCoercion { .. }));
        assert!(sink.written.borrow().is_empty());
    }

    #[test]
    fn failing_sink_does_not_undo_earlier_sinks() {
        let good = MemorySink::default();
        let bad = MemorySink {
            fail: true,
            ..Default::default()
        };
        let after = MemorySink::default();
        let p = pipeline(
            Box::new(FixedSource(raw())),
            Preset::Local,
            vec![
                Box::new(good.clone()),
                Box::new(bad),
                Box::new(after.clone()),
            ],
        );

        let err = p.run(&RecordingReporter::new()).unwrap_err();

        assert_eq!(err.phase, Phase::Loading);
        assert_eq!(good.written.borrow().len(), 1);
        assert!(after.written.borrow().is_empty());
    }

    #[test]
    fn managed_sink_requires_credentials() {
        let config = Config::preset(Preset::Managed);
        let err = Pipeline::from_config(&config, &Credentials::default()).err();
        assert!(matches!(err, Some(EtlError::Configuration(_))));
    }

    #[test]
    fn configuration_failure_is_reported_as_its_own_phase() {
        let config = Config::preset(Preset::Managed);
        let reporter = RecordingReporter::new();

        let err = run_phase(Phase::Configuration, &reporter, || {
            Pipeline::from_config(&config, &Credentials::default())
        })
        .err()
        .unwrap();

        assert_eq!(err.phase, Phase::Configuration);
        assert!(matches!(err.source, EtlError::Configuration(_)));
        assert!(reporter.has(Level::Error, "Configuration failed: "));
    }

    #[test]
    fn plan_describes_steps_and_sinks() {
        let plan = PipelinePlan::from_config(&Config::preset(Preset::Local));
        assert_eq!(plan.source, "object tungstennn-bucket/messy_raw_data.csv");
        assert_eq!(plan.steps[0], "mean imputation on sales");
        assert_eq!(
            plan.sinks,
            vec![
                "table cleaned_data on sqlite:///my_database.db",
                "csv file cleaned_data.csv"
            ]
        );
    }
}
