use std::collections::HashMap;

use crate::config::MissingValuePolicy;
use crate::dataset::{ColumnType, Dataset, Value};
use crate::error::{EtlError, Result};
use crate::metrics::EtlMetrics;
use crate::pipeline::report::Reporter;

const STAGE: &str = "missing_values";

/// Treats missing values in `columns` (every column when `None`) according
/// to `policy`.
pub fn handle_missing_values(
    mut dataset: Dataset,
    policy: MissingValuePolicy,
    columns: Option<&[String]>,
    reporter: &dyn Reporter,
) -> Result<Dataset> {
    let targets: Vec<usize> = match columns {
        Some(names) => names
            .iter()
            .map(|name| dataset.require_column(name))
            .collect::<Result<_>>()?,
        None => (0..dataset.width()).collect(),
    };

    for idx in targets {
        let name = dataset.columns()[idx].clone();
        if policy == MissingValuePolicy::Remove {
            let removed = dataset.retain_rows(|row| !row[idx].is_missing());
            EtlMetrics::record_rows_dropped(STAGE, removed);
            if removed > 0 {
                reporter.info(
                    STAGE,
                    &format!("Removed {removed} rows with missing '{name}'."),
                );
            }
            continue;
        }

        let Some(fill) = fill_value(&dataset, idx, policy)? else {
            reporter.warn(
                STAGE,
                &format!("Column '{name}' has no values; cannot compute {policy}, left as is."),
            );
            continue;
        };

        if matches!(fill, Value::Float(_)) && dataset.column_type(idx) == ColumnType::Integer {
            for row in dataset.rows_mut() {
                if let Value::Integer(i) = row[idx] {
                    row[idx] = Value::Float(i as f64);
                }
            }
            dataset.set_column_type(idx, ColumnType::Float);
        }

        let mut filled = 0usize;
        for row in dataset.rows_mut() {
            if row[idx].is_missing() {
                row[idx] = fill.clone();
                filled += 1;
            }
        }
        if filled > 0 {
            reporter.info(
                STAGE,
                &format!("Filled {filled} missing values in '{name}' with {policy} {fill}."),
            );
        }
    }

    reporter.info(STAGE, "Handled missing values.");
    Ok(dataset)
}

/// The replacement for missing cells, or `None` when the column has no
/// present value to derive it from.
fn fill_value(dataset: &Dataset, idx: usize, policy: MissingValuePolicy) -> Result<Option<Value>> {
    if policy == MissingValuePolicy::Mode {
        return Ok(mode(dataset.column(idx)));
    }

    if !dataset.column_type(idx).is_numeric() {
        return Err(EtlError::NonNumeric {
            column: dataset.columns()[idx].clone(),
            operation: format!("{policy} imputation"),
        });
    }

    let mut values: Vec<f64> = dataset.column(idx).filter_map(Value::as_f64).collect();
    if values.is_empty() {
        return Ok(None);
    }

    let fill = if policy == MissingValuePolicy::Median {
        values.sort_by(f64::total_cmp);
        let mid = values.len() / 2;
        if values.len() % 2 == 0 {
            (values[mid - 1] + values[mid]) / 2.0
        } else {
            values[mid]
        }
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    };
    Ok(Some(Value::from_f64(fill)))
}

/// Most frequent present value; ties go to the value seen first.
fn mode<'a>(values: impl Iterator<Item = &'a Value>) -> Option<Value> {
    let mut counts: HashMap<&Value, (usize, usize)> = HashMap::new();
    for (pos, value) in values.filter(|v| !v.is_missing()).enumerate() {
        counts.entry(value).or_insert((0, pos)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(value, _)| value.clone())
}
