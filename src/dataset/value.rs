use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EtlError;

/// Tokens that read as a missing value when parsing text cells.
pub const NA_TOKENS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "NULL", "null", "None", "#N/A", "<NA>",
];

/// Primitive type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Text,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Text => "text",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" | "i64" | "int64" => Ok(ColumnType::Integer),
            "float" | "f64" | "float64" | "double" => Ok(ColumnType::Float),
            "bool" | "boolean" => Ok(ColumnType::Boolean),
            "text" | "str" | "string" => Ok(ColumnType::Text),
            other => Err(EtlError::Configuration(format!(
                "unknown column type '{other}'. Use 'float', 'integer', 'boolean' or 'text'"
            ))),
        }
    }
}

impl TryFrom<String> for ColumnType {
    type Error = EtlError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ColumnType> for String {
    fn from(value: ColumnType) -> Self {
        value.as_str().to_string()
    }
}

/// A single cell.
///
/// `Float` never holds NaN; a NaN produced anywhere in the pipeline is
/// stored as `Missing` instead (see [`Value::from_f64`]).
#[derive(Debug, Clone)]
pub enum Value {
    Missing,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
}

impl Value {
    pub fn from_f64(value: f64) -> Self {
        if value.is_nan() {
            Value::Missing
        } else {
            Value::Float(value)
        }
    }

    /// Interprets a raw text cell, mapping the NA tokens to `Missing`.
    pub fn parse_cell(raw: &str) -> Self {
        if NA_TOKENS.contains(&raw.trim()) {
            Value::Missing
        } else {
            Value::Text(raw.to_string())
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Numeric view of the value; text is not parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Renders the value the way it is written to CSV. Missing renders empty.
    pub fn render(&self) -> String {
        match self {
            Value::Missing => String::new(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Boolean(b) => if *b { "True" } else { "False" }.to_string(),
            Value::Text(s) => s.clone(),
        }
    }

    /// Converts the value to `target`, returning `None` when it cannot be
    /// represented. `Missing` converts to `Missing` for every target.
    pub fn cast(&self, target: ColumnType) -> Option<Value> {
        if self.is_missing() {
            return Some(Value::Missing);
        }
        match target {
            ColumnType::Float => match self {
                Value::Integer(i) => Some(Value::Float(*i as f64)),
                Value::Float(f) => Some(Value::Float(*f)),
                Value::Boolean(b) => Some(Value::Float(if *b { 1.0 } else { 0.0 })),
                Value::Text(s) => s.trim().parse::<f64>().ok().map(Value::from_f64),
                Value::Missing => Some(Value::Missing),
            },
            ColumnType::Integer => match self {
                Value::Integer(i) => Some(Value::Integer(*i)),
                Value::Float(f) if f.is_finite() && f.abs() < i64::MAX as f64 => {
                    Some(Value::Integer(f.trunc() as i64))
                }
                Value::Float(_) => None,
                Value::Boolean(b) => Some(Value::Integer(i64::from(*b))),
                Value::Text(s) => s.trim().parse::<i64>().ok().map(Value::Integer),
                Value::Missing => Some(Value::Missing),
            },
            ColumnType::Boolean => match self {
                Value::Boolean(b) => Some(Value::Boolean(*b)),
                Value::Integer(i) => Some(Value::Boolean(*i != 0)),
                Value::Float(f) => Some(Value::Boolean(*f != 0.0)),
                Value::Text(s) => parse_bool(s).map(Value::Boolean),
                Value::Missing => Some(Value::Missing),
            },
            ColumnType::Text => Some(Value::Text(self.render())),
        }
    }
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

/// Whole floats keep a trailing `.0` so a float column stays recognisable
/// as float when the file is read back.
fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

/// Hashable projection used for equality. `-0.0` and `0.0` compare equal.
#[derive(PartialEq, Eq, Hash)]
enum Key<'a> {
    Missing,
    Integer(i64),
    Float(u64),
    Boolean(bool),
    Text(&'a str),
}

impl Value {
    fn key(&self) -> Key<'_> {
        match self {
            Value::Missing => Key::Missing,
            Value::Integer(i) => Key::Integer(*i),
            Value::Float(f) => Key::Float(if *f == 0.0 { 0 } else { f.to_bits() }),
            Value::Boolean(b) => Key::Boolean(*b),
            Value::Text(s) => Key::Text(s),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => f.write_str("NaN"),
            other => f.write_str(&other.render()),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::from_f64(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<Option<f64>> for Value {
    fn from(value: Option<f64>) -> Self {
        value.map(Value::from_f64).unwrap_or(Value::Missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn na_tokens_parse_as_missing() {
        for token in ["", "  ", "NaN", "NULL", "n/a", "<NA>"] {
            assert!(Value::parse_cell(token).is_missing(), "token {token:?}");
        }
        assert_eq!(Value::parse_cell("0"), Value::Text("0".into()));
    }

    #[test]
    fn whole_floats_render_with_decimal_point() {
        assert_eq!(Value::Float(15.0).render(), "15.0");
        assert_eq!(Value::Float(12.25).render(), "12.25");
        assert_eq!(Value::Missing.render(), "");
    }

    #[test]
    fn cast_text_to_float() {
        assert_eq!(
            Value::from(" 10.5 ").cast(ColumnType::Float),
            Some(Value::Float(10.5))
        );
        assert_eq!(Value::from("ten").cast(ColumnType::Float), None);
        assert_eq!(
            Value::Missing.cast(ColumnType::Float),
            Some(Value::Missing)
        );
    }

    #[test]
    fn cast_float_to_integer_truncates() {
        assert_eq!(
            Value::Float(12.9).cast(ColumnType::Integer),
            Some(Value::Integer(12))
        );
        assert_eq!(Value::Float(f64::INFINITY).cast(ColumnType::Integer), None);
        assert_eq!(Value::from("1.5").cast(ColumnType::Integer), None);
    }

    #[test]
    fn signed_zero_is_one_value() {
        assert_eq!(Value::Float(0.0), Value::Float(-0.0));
    }

    #[test]
    fn column_type_names_are_closed() {
        assert_eq!("FLOAT".parse::<ColumnType>().unwrap(), ColumnType::Float);
        assert_eq!("int".parse::<ColumnType>().unwrap(), ColumnType::Integer);
        assert!(matches!(
            "datetime".parse::<ColumnType>(),
            Err(EtlError::Configuration(_))
        ));
    }
}
