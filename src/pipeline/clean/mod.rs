//! Cleaning steps.
//!
//! Each step is a function from one [`Dataset`] to the next. A [`Cleaner`]
//! runs the enabled steps in a fixed order: missing values, column names,
//! date delimiter, outliers, duplicates, column types.

mod coerce;
mod dates;
mod duplicates;
mod missing;
mod names;
mod outliers;

pub use coerce::convert_data_types;
pub use dates::normalize_delimiter;
pub use duplicates::remove_duplicates;
pub use missing::handle_missing_values;
pub use names::{normalize_name, standardize_column_names};
pub use outliers::remove_outliers;

use tracing::instrument;

use super::report::Reporter;
use crate::config::{CleaningConfig, MissingValuePolicy};
use crate::dataset::{ColumnType, Dataset};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub enum CleaningStep {
    MissingValues {
        policy: MissingValuePolicy,
        columns: Option<Vec<String>>,
    },
    StandardizeNames,
    DateDelimiter {
        column: String,
        from: String,
        to: String,
    },
    Outliers {
        column: String,
        max: f64,
    },
    DropDuplicates,
    CoerceTypes(Vec<(String, ColumnType)>),
}

impl CleaningStep {
    pub fn name(&self) -> &'static str {
        match self {
            CleaningStep::MissingValues { .. } => "missing_values",
            CleaningStep::StandardizeNames => "column_names",
            CleaningStep::DateDelimiter { .. } => "date_delimiter",
            CleaningStep::Outliers { .. } => "outliers",
            CleaningStep::DropDuplicates => "duplicates",
            CleaningStep::CoerceTypes(_) => "column_types",
        }
    }

    /// One-line human description, used by `check`.
    pub fn describe(&self) -> String {
        match self {
            CleaningStep::MissingValues { policy, columns } => match columns {
                Some(cols) => format!("{policy} imputation on {}", cols.join(", ")),
                None => format!("{policy} imputation on every column"),
            },
            CleaningStep::StandardizeNames => {
                "lower-case column names, spaces to underscores".into()
            }
            CleaningStep::DateDelimiter { column, from, to } => {
                format!("replace '{from}' with '{to}' in {column}")
            }
            CleaningStep::Outliers { column, max } => format!("drop rows with {column} > {max}"),
            CleaningStep::DropDuplicates => "drop duplicate rows".into(),
            CleaningStep::CoerceTypes(mapping) => {
                let parts: Vec<String> =
                    mapping.iter().map(|(c, t)| format!("{c} as {t}")).collect();
                format!("cast {}", parts.join(", "))
            }
        }
    }

    pub fn apply(&self, dataset: Dataset, reporter: &dyn Reporter) -> Result<Dataset> {
        match self {
            CleaningStep::MissingValues { policy, columns } => {
                handle_missing_values(dataset, *policy, columns.as_deref(), reporter)
            }
            CleaningStep::StandardizeNames => Ok(standardize_column_names(dataset, reporter)),
            CleaningStep::DateDelimiter { column, from, to } => {
                normalize_delimiter(dataset, column, from, to, reporter)
            }
            CleaningStep::Outliers { column, max } => {
                remove_outliers(dataset, column, *max, reporter)
            }
            CleaningStep::DropDuplicates => Ok(remove_duplicates(dataset, reporter)),
            CleaningStep::CoerceTypes(mapping) => convert_data_types(dataset, mapping, reporter),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cleaner {
    steps: Vec<CleaningStep>,
}

impl Cleaner {
    pub fn new(steps: Vec<CleaningStep>) -> Self {
        Self { steps }
    }

    /// Lays the configured steps out in their fixed order.
    pub fn from_config(config: &CleaningConfig) -> Self {
        let mut steps = vec![
            CleaningStep::MissingValues {
                policy: config.missing_values.policy,
                columns: config.missing_values.columns.clone(),
            },
            CleaningStep::StandardizeNames,
        ];
        if let Some(delimiter) = &config.date_delimiter {
            steps.push(CleaningStep::DateDelimiter {
                column: delimiter.column.clone(),
                from: delimiter.from.clone(),
                to: delimiter.to.clone(),
            });
        }
        if let Some(outliers) = &config.outliers {
            steps.push(CleaningStep::Outliers {
                column: outliers.column.clone(),
                max: outliers.max,
            });
        }
        if config.drop_duplicates {
            steps.push(CleaningStep::DropDuplicates);
        }
        if !config.column_types.is_empty() {
            steps.push(CleaningStep::CoerceTypes(
                config
                    .column_types
                    .iter()
                    .map(|(column, ty)| (column.clone(), *ty))
                    .collect(),
            ));
        }
        Self { steps }
    }

    pub fn steps(&self) -> &[CleaningStep] {
        &self.steps
    }

    #[instrument(skip_all, fields(rows = dataset.len()))]
    pub fn clean(&self, dataset: Dataset, reporter: &dyn Reporter) -> Result<Dataset> {
        self.steps
            .iter()
            .try_fold(dataset, |ds, step| step.apply(ds, reporter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Preset};
    use crate::dataset::test_support::{sales_column, text_dataset};
    use crate::dataset::Value;
    use crate::error::EtlError;
    use crate::pipeline::report::RecordingReporter;

    fn raw() -> Dataset {
        text_dataset(
            &["date", "category", "sales", "region"],
            &[
                &["2024/01/01", "Books", "10", "North"],
                &["2024/01/02", "Toys", "", "South"],
                &["2024/01/03", "Books", "2000", "East"],
                &["2024/01/01", "Books", "10", "North"],
                &["2024/01/04", "Games", "20", "West"],
            ],
        )
    }

    fn names(cleaner: &Cleaner) -> Vec<&'static str> {
        cleaner.steps().iter().map(CleaningStep::name).collect()
    }

    #[test]
    fn presets_lay_out_steps_in_fixed_order() {
        let local = Cleaner::from_config(&Config::preset(Preset::Local).cleaning);
        assert_eq!(
            names(&local),
            vec!["missing_values", "column_names", "duplicates", "column_types"]
        );

        let managed = Cleaner::from_config(&Config::preset(Preset::Managed).cleaning);
        assert_eq!(
            names(&managed),
            vec![
                "missing_values",
                "column_names",
                "date_delimiter",
                "outliers",
                "column_types"
            ]
        );
    }

    #[test]
    fn local_preset_imputes_and_dedupes() {
        let cleaner = Cleaner::from_config(&Config::preset(Preset::Local).cleaning);
        let out = cleaner.clean(raw(), &RecordingReporter::new()).unwrap();

        // (10 + 2000 + 10 + 20) / 4 = 510
        assert_eq!(out.len(), 4);
        assert_eq!(
            sales_column(&out),
            vec![
                Value::Float(10.0),
                Value::Float(510.0),
                Value::Float(2000.0),
                Value::Float(20.0)
            ]
        );
    }

    #[test]
    fn managed_preset_removes_and_filters() {
        let cleaner = Cleaner::from_config(&Config::preset(Preset::Managed).cleaning);
        let out = cleaner.clean(raw(), &RecordingReporter::new()).unwrap();

        assert_eq!(out.len(), 3);
        assert_eq!(out.rows()[0][0], Value::from("2024-01-01"));
        assert!(sales_column(&out).iter().all(|v| matches!(v, Value::Float(f) if *f <= 1500.0)));
    }

    #[test]
    fn first_failing_step_stops_the_run() {
        let cleaner = Cleaner::new(vec![
            CleaningStep::CoerceTypes(vec![("region".into(), ColumnType::Float)]),
            CleaningStep::DropDuplicates,
        ]);
        let reporter = RecordingReporter::new();
        let err = cleaner.clean(raw(), &reporter).unwrap_err();
        assert!(matches!(err, EtlError::TypeCoercion { .. }));
        assert!(reporter.messages_for("duplicates").is_empty());
    }

    #[test]
    fn cleaning_never_drops_columns() {
        let cleaner = Cleaner::from_config(&Config::preset(Preset::Managed).cleaning);
        let out = cleaner.clean(raw(), &RecordingReporter::new()).unwrap();
        assert_eq!(out.columns(), &["date", "category", "sales", "region"]);
    }
}
