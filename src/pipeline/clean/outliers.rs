use crate::dataset::{Dataset, Value};
use crate::error::{EtlError, Result};
use crate::metrics::EtlMetrics;
use crate::pipeline::report::Reporter;

const STAGE: &str = "outliers";

/// Drops rows whose value in `column` is strictly greater than `max`.
/// Missing values are kept; relative order of the survivors is preserved.
pub fn remove_outliers(
    mut dataset: Dataset,
    column: &str,
    max: f64,
    reporter: &dyn Reporter,
) -> Result<Dataset> {
    let idx = dataset.require_column(column)?;

    let mut mask = Vec::with_capacity(dataset.len());
    for value in dataset.column(idx) {
        let keep = match value {
            Value::Missing => true,
            Value::Integer(_) | Value::Float(_) => value.as_f64().map_or(true, |v| v <= max),
            Value::Text(raw) => match raw.trim().parse::<f64>() {
                Ok(v) => v <= max,
                Err(_) => {
                    return Err(EtlError::NonNumeric {
                        column: column.to_string(),
                        operation: format!("outlier filter (max {max})"),
                    })
                }
            },
            Value::Boolean(_) => {
                return Err(EtlError::NonNumeric {
                    column: column.to_string(),
                    operation: format!("outlier filter (max {max})"),
                })
            }
        };
        mask.push(keep);
    }

    let removed = dataset.retain_mask(&mask);
    EtlMetrics::record_rows_dropped(STAGE, removed);
    reporter.info(
        STAGE,
        &format!("Removed {removed} outliers with '{column}' above {max}."),
    );
    Ok(dataset)
}
