use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::path::PathBuf;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod column;
pub mod grouping;
pub mod ops;
pub mod parser;
pub mod query_cache;
pub mod relation;
pub mod stats;

/// Error type used across the crate
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("File not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown aggregate function: {0}")]
    UnknownAggregate(String),

    #[error("Delimiter must be a single byte, got {0:?}")]
    InvalidDelimiter(char),
}

/// Outcome of a diagnostic scan over a source
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ParseSummary {
    pub rows_processed: usize,
    pub errors: Vec<ParseError>,
}

/// A single record (or row) that normal traversal drops silently
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseError {
    pub row: usize,
    pub column: String,
    pub value: String,
    pub error: String,
}

/// One row: column name to value, in column order
pub type Row = IndexMap<String, Value>;

/// Cell value (owned)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Missing or empty cell
    #[default]
    Null,
    /// Integer cell
    Int(i64),
    /// Float cell
    Float(f64),
    /// Text cell, also used for values that failed their column's cast
    Str(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null or the empty string
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Str(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Falsy values never take part in a join.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Str(s) => !s.is_empty(),
        }
    }

    /// Floating-point coercion; `None` for missing and non-numeric values
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Null => None,
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Str(s) => column::parse_float(s),
        }
    }
}

impl PartialEq for Value {
    /// Numbers compare by value across `Int` and `Float`, so `Int(1)` and
    /// `Float(1.0)` are the same group or join key.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                exact_int(*b) == Some(*a)
            }
            (Value::Float(a), Value::Float(b)) => match (exact_int(*a), exact_int(*b)) {
                (Some(a), Some(b)) => a == b,
                _ => a.to_bits() == b.to_bits(),
            },
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => 0u8.hash(state),
            Value::Int(v) => {
                1u8.hash(state);
                v.hash(state);
            }
            Value::Float(v) => match exact_int(*v) {
                Some(i) => {
                    1u8.hash(state);
                    i.hash(state);
                }
                None => {
                    2u8.hash(state);
                    v.to_bits().hash(state);
                }
            },
            Value::Str(v) => {
                3u8.hash(state);
                v.hash(state);
            }
        }
    }
}

/// The `i64` an integral float stands for exactly, if any
fn exact_int(v: f64) -> Option<i64> {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0; // 2^63
    if v.fract() == 0.0 && (-LIMIT..LIMIT).contains(&v) {
        Some(v as i64)
    } else {
        None
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(v) => write!(f, "{v}"),
            // integral floats keep their fractional marker: 10.0, not 10
            Value::Float(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 => {
                write!(f, "{v:.1}")
            }
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Per-group aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFn {
    /// Number of rows in the group, whatever the column holds
    Count,
    /// Sum of numeric values
    Sum,
    /// Arithmetic mean of numeric values (tag `mean` or `avg`)
    Mean,
    /// Minimum numeric value
    Min,
    /// Maximum numeric value
    Max,
    /// Sample standard deviation
    Std,
}

impl AggregateFn {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFn::Count => "count",
            AggregateFn::Sum => "sum",
            AggregateFn::Mean => "mean",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
            AggregateFn::Std => "std",
        }
    }
}

impl FromStr for AggregateFn {
    type Err = EngineError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "count" => Ok(AggregateFn::Count),
            "sum" => Ok(AggregateFn::Sum),
            "mean" | "avg" => Ok(AggregateFn::Mean),
            "min" => Ok(AggregateFn::Min),
            "max" => Ok(AggregateFn::Max),
            "std" => Ok(AggregateFn::Std),
            other => Err(EngineError::UnknownAggregate(other.to_string())),
        }
    }
}

impl fmt::Display for AggregateFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
