//! In-memory tabular dataset.
//!
//! A [`Dataset`] is an ordered list of named, typed columns plus an ordered
//! list of rows. Every row holds exactly one [`Value`] per column. Stages
//! take a dataset by value and hand back the next one.

pub mod codec;
mod value;

pub use value::{ColumnType, Value, NA_TOKENS};

use crate::error::{EtlError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    types: Vec<ColumnType>,
    rows: Vec<Vec<Value>>,
}

impl Dataset {
    /// Builds a dataset with explicit column types. Every row must be as wide
    /// as the column list.
    pub fn new(columns: Vec<(String, ColumnType)>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let (columns, types): (Vec<_>, Vec<_>) = columns.into_iter().unzip();
        check_widths(columns.len(), &rows)?;
        Ok(Self {
            columns,
            types,
            rows,
        })
    }

    /// Builds a dataset and infers each column's type from its values.
    ///
    /// A column is `Integer` when every present value is an integer (or text
    /// that parses as one), `Float` when every present value is numeric,
    /// `Boolean` when every present value is a boolean or `true`/`false`
    /// text, and `Text` otherwise. A column with no present values is
    /// `Float`. Cells are converted to the inferred type.
    pub fn infer(columns: Vec<String>, mut rows: Vec<Vec<Value>>) -> Result<Self> {
        check_widths(columns.len(), &rows)?;
        let mut types = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            let ty = infer_column(rows.iter().map(|row| &row[idx]));
            for row in rows.iter_mut() {
                // infer_column only picks a type every present value casts to
                if let Some(cast) = row[idx].cast(ty) {
                    row[idx] = cast;
                }
            }
            types.push(ty);
        }
        Ok(Self {
            columns,
            types,
            rows,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_types(&self) -> &[ColumnType] {
        &self.types
    }

    pub fn column_type(&self, idx: usize) -> ColumnType {
        self.types[idx]
    }

    pub fn set_column_type(&mut self, idx: usize, ty: ColumnType) {
        self.types[idx] = ty;
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [Vec<Value>] {
        &mut self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Like [`Dataset::column_index`] but fails with `UnknownColumn`.
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name).ok_or_else(|| EtlError::UnknownColumn {
            column: name.to_string(),
        })
    }

    pub fn column(&self, idx: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().map(move |row| &row[idx])
    }

    pub fn rename_columns<F>(&mut self, mut rename: F)
    where
        F: FnMut(&str) -> String,
    {
        for name in self.columns.iter_mut() {
            *name = rename(name);
        }
    }

    /// Keeps the rows for which `keep` returns true, preserving their order.
    /// Returns the number of rows removed.
    pub fn retain_rows<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&[Value]) -> bool,
    {
        let before = self.rows.len();
        self.rows.retain(|row| keep(row));
        before - self.rows.len()
    }

    /// Keeps row `i` when `mask[i]` is true. The mask must cover every row.
    pub fn retain_mask(&mut self, mask: &[bool]) -> usize {
        debug_assert_eq!(mask.len(), self.rows.len());
        let mut flags = mask.iter();
        self.retain_rows(|_| flags.next().copied().unwrap_or(true))
    }
}

fn check_widths(width: usize, rows: &[Vec<Value>]) -> Result<()> {
    if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
        return Err(EtlError::Shape(format!(
            "row {idx} has {} values but the dataset has {width} columns",
            row.len()
        )));
    }
    Ok(())
}

fn infer_column<'a>(values: impl Iterator<Item = &'a Value>) -> ColumnType {
    let mut integer = true;
    let mut float = true;
    let mut boolean = true;
    let mut seen = false;

    for value in values {
        let (is_int, is_float, is_bool) = match value {
            Value::Missing => continue,
            Value::Integer(_) => (true, true, false),
            Value::Float(_) => (false, true, false),
            Value::Boolean(_) => (false, false, true),
            Value::Text(s) => {
                let t = s.trim();
                (
                    t.parse::<i64>().is_ok(),
                    t.parse::<f64>().is_ok(),
                    t.eq_ignore_ascii_case("true") || t.eq_ignore_ascii_case("false"),
                )
            }
        };
        seen = true;
        integer &= is_int;
        float &= is_float;
        boolean &= is_bool;
        if !(integer || float || boolean) {
            return ColumnType::Text;
        }
    }

    if !seen {
        ColumnType::Float
    } else if integer {
        ColumnType::Integer
    } else if float {
        ColumnType::Float
    } else if boolean {
        ColumnType::Boolean
    } else {
        ColumnType::Text
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Builds a dataset from text cells the way the CSV reader would.
    pub fn text_dataset(columns: &[&str], rows: &[&[&str]]) -> Dataset {
        let rows = rows
            .iter()
            .map(|r| r.iter().map(|c| Value::parse_cell(c)).collect())
            .collect();
        Dataset::infer(columns.iter().map(|c| c.to_string()).collect(), rows)
            .expect("test rows match the column count")
    }

    pub fn sales_column(dataset: &Dataset) -> Vec<Value> {
        let idx = dataset.column_index("sales").expect("sales column");
        dataset.column(idx).cloned().collect()
    }
}
