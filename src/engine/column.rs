use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::engine::Value;

/// Inferred column type.
///
/// Ordered as a lattice `Integer > Float > Text`: inference starts every
/// column at `Integer` and only ever demotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    #[serde(rename = "int")]
    Integer,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "str")]
    Text,
}

/// Column name to inferred type, in header order
pub type Schema = IndexMap<String, ColumnType>;

impl ColumnType {
    /// Most specific type a single text value supports. Integer literals
    /// too wide for `i64` still classify as `Integer`; they are cast to
    /// their text rather than to a lossy float.
    pub fn classify(raw: &str) -> ColumnType {
        if parse_int(raw).is_some() || is_integer_literal(raw) {
            ColumnType::Integer
        } else if parse_float(raw).is_some() {
            ColumnType::Float
        } else {
            ColumnType::Text
        }
    }

    /// Type of a column currently at `self` after observing `raw`.
    /// Empty values leave the column untouched.
    pub fn observe(self, raw: &str) -> ColumnType {
        if raw.is_empty() || self == ColumnType::Text {
            return self;
        }
        self.demote(ColumnType::classify(raw))
    }

    /// Meet of two lattice points
    pub fn demote(self, other: ColumnType) -> ColumnType {
        match (self, other) {
            (ColumnType::Text, _) | (_, ColumnType::Text) => ColumnType::Text,
            (ColumnType::Float, _) | (_, ColumnType::Float) => ColumnType::Float,
            _ => ColumnType::Integer,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }

    /// Casts a raw field to this type. Empty fields become `Null`; a field
    /// that does not parse keeps its raw text.
    pub fn cast(self, raw: &str) -> Value {
        if raw.is_empty() {
            return Value::Null;
        }
        match self {
            ColumnType::Integer => parse_int(raw).map_or_else(|| Value::from(raw), Value::Int),
            ColumnType::Float => parse_float(raw).map_or_else(|| Value::from(raw), Value::Float),
            ColumnType::Text => Value::from(raw),
        }
    }

    /// Type of an in-memory value, used when a relation is built from rows
    pub fn of_value(value: &Value) -> ColumnType {
        match value {
            Value::Int(_) => ColumnType::Integer,
            Value::Float(_) => ColumnType::Float,
            Value::Str(s) => ColumnType::classify(s),
            Value::Null => ColumnType::Text,
        }
    }
}

/// Integer parse tolerant of surrounding whitespace and a leading `+`
pub fn parse_int(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    let digits = match trimmed.strip_prefix('+') {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest,
        _ => trimmed,
    };
    if digits.is_empty() {
        return None;
    }
    atoi_simd::parse::<i64>(digits.as_bytes()).ok()
}

/// Optional sign followed by decimal digits only
fn is_integer_literal(raw: &str) -> bool {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix(['+', '-'])
        .unwrap_or(trimmed);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Float parse tolerant of surrounding whitespace
pub fn parse_float(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    fast_float::parse::<f64, _>(trimmed).ok()
}
