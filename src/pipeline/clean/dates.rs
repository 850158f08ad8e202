use crate::dataset::{Dataset, Value};
use crate::error::Result;
use crate::pipeline::report::Reporter;

const STAGE: &str = "date_delimiter";

/// Rewrites `from` to `to` inside every text value of `column`. Values are
/// never parsed as dates; non-text cells are left as they are.
pub fn normalize_delimiter(
    mut dataset: Dataset,
    column: &str,
    from: &str,
    to: &str,
    reporter: &dyn Reporter,
) -> Result<Dataset> {
    let idx = dataset.require_column(column)?;

    let mut rewritten = 0usize;
    for row in dataset.rows_mut() {
        if let Value::Text(text) = &mut row[idx] {
            if text.contains(from) {
                *text = text.replace(from, to);
                rewritten += 1;
            }
        }
    }

    reporter.info(
        STAGE,
        &format!("Date separator consistent in '{column}' ({rewritten} values rewritten)."),
    );
    Ok(dataset)
}
