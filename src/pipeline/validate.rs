use crate::dataset::Dataset;
use crate::error::{EtlError, Result};

/// Fails with a schema error listing every required column that is absent,
/// in the order they were required.
pub fn validate_columns(dataset: &Dataset, required: &[String]) -> Result<()> {
    let missing: Vec<String> = required
        .iter()
        .filter(|name| dataset.column_index(name).is_none())
        .cloned()
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(EtlError::Schema { missing })
    }
}
