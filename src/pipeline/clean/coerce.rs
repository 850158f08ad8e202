use crate::dataset::{ColumnType, Dataset};
use crate::error::{EtlError, Result};
use crate::pipeline::report::Reporter;

const STAGE: &str = "column_types";

/// Casts each listed column to its target type. The first value that cannot
/// be represented fails the whole step; missing values stay missing.
pub fn convert_data_types(
    mut dataset: Dataset,
    mapping: &[(String, ColumnType)],
    reporter: &dyn Reporter,
) -> Result<Dataset> {
    for (column, target) in mapping {
        let idx = dataset.require_column(column)?;
        for row in dataset.rows_mut() {
            let cast = row[idx]
                .cast(*target)
                .ok_or_else(|| EtlError::TypeCoercion {
                    column: column.clone(),
                    value: row[idx].render(),
                    target: *target,
                })?;
            row[idx] = cast;
        }
        dataset.set_column_type(idx, *target);
    }

    reporter.info(STAGE, "Converted data types.");
    Ok(dataset)
}
