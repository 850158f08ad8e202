use std::collections::HashSet;

use crate::dataset::Dataset;
use crate::metrics::EtlMetrics;
use crate::pipeline::report::Reporter;

const STAGE: &str = "duplicates";

/// Drops rows identical to an earlier row across every column.
pub fn remove_duplicates(mut dataset: Dataset, reporter: &dyn Reporter) -> Dataset {
    let mask: Vec<bool> = {
        let mut seen = HashSet::with_capacity(dataset.len());
        dataset.rows().iter().map(|row| seen.insert(row.as_slice())).collect()
    };

    let removed = dataset.retain_mask(&mask);
    EtlMetrics::record_rows_dropped(STAGE, removed);
    reporter.info(STAGE, &format!("Removed {removed} duplicate rows."));
    dataset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::test_support::text_dataset;
    use crate::dataset::Value;
    use crate::pipeline::report::RecordingReporter;

    #[test]
    fn keeps_first_occurrence_in_order() {
        let ds = text_dataset(
            &["region", "sales"],
            &[
                &["North", "10"],
                &["South", "20"],
                &["North", "10"],
                &["North", "11"],
                &["South", "20"],
            ],
        );
        let reporter = RecordingReporter::new();
        let out = remove_duplicates(ds, &reporter);

        assert_eq!(out.len(), 3);
        assert_eq!(
            out.column(1).cloned().collect::<Vec<_>>(),
            vec![Value::Integer(10), Value::Integer(20), Value::Integer(11)]
        );
        assert_eq!(
            reporter.messages_for(STAGE),
            vec!["Removed 2 duplicate rows."]
        );
    }

    #[test]
    fn missing_cells_compare_equal() {
        let ds = text_dataset(&["a", "b"], &[&["1", ""], &["1", "NaN"]]);
        let out = remove_duplicates(ds, &RecordingReporter::new());
        assert_eq!(out.len(), 1);
    }
}
