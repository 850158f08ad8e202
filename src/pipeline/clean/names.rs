use std::collections::HashSet;

use crate::dataset::Dataset;
use crate::pipeline::report::Reporter;

const STAGE: &str = "column_names";

/// Lower-cases `name` and replaces spaces with underscores.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

pub fn standardize_column_names(mut dataset: Dataset, reporter: &dyn Reporter) -> Dataset {
    dataset.rename_columns(normalize_name);

    {
        let mut seen = HashSet::new();
        for name in dataset.columns() {
            if !seen.insert(name.as_str()) {
                reporter.warn(
                    STAGE,
                    &format!("More than one column is named '{name}' after normalization."),
                );
            }
        }
    }

    reporter.info(STAGE, "Standardized column names.");
    dataset
}
