//! Field value types and ordering

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

/// A polymorphic field value that can hold the kinds a record field supports
///
/// Variant order matters for untagged deserialization: `String` is tried
/// before `DateTime`, so text read back from JSON stays text and only a
/// writer that built a `DateTime` holds one. `Json` is last so only objects
/// and arrays land there.
///
/// A `DateTime` behaves as its RFC 3339 text wherever text is compared, so
/// a timestamp kept in memory and the same timestamp read back as a string
/// filter, search and sort alike.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    DateTime(DateTime<Utc>),
    Null,
    Json(Value),
}

impl FieldValue {
    /// Get the value as a string if possible
    pub fn as_string(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as an integer if possible
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get any numeric value widened to `f64`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Textual view used by string filters and sorting.
    ///
    /// Timestamps render as RFC 3339, the same text they are stored as.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            FieldValue::String(s) => Some(Cow::Borrowed(s)),
            FieldValue::DateTime(dt) => Some(Cow::Owned(dt.to_rfc3339())),
            _ => None,
        }
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldValue::Integer(_) | FieldValue::Float(_))
    }

    /// Text used by full-text search. Only scalar values are searchable.
    pub fn searchable_text(&self) -> Option<String> {
        match self {
            FieldValue::String(s) => Some(s.clone()),
            FieldValue::Integer(i) => Some(i.to_string()),
            FieldValue::Float(f) => Some(f.to_string()),
            FieldValue::DateTime(dt) => Some(dt.to_rfc3339()),
            _ => None,
        }
    }

    /// Convert a JSON value into a field value.
    ///
    /// Strings are kept verbatim, including ones that look like timestamps.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Boolean(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => FieldValue::String(s),
            other => FieldValue::Json(other),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Null => Value::Null,
            FieldValue::Json(v) => v.clone(),
        }
    }

    /// Rank of the value's kind in the cross-kind sort order.
    fn kind_rank(&self) -> u8 {
        match self {
            FieldValue::Null => 0,
            FieldValue::Boolean(_) => 1,
            FieldValue::Integer(_) | FieldValue::Float(_) => 2,
            FieldValue::String(_) | FieldValue::DateTime(_) => 3,
            FieldValue::Json(_) => 4,
        }
    }

    /// Total order used by sorting.
    ///
    /// Kinds order as null < boolean < number < text < json, timestamps
    /// counting as text.
    pub fn sort_cmp(&self, other: &FieldValue) -> Ordering {
        match (self, other) {
            (FieldValue::Boolean(a), FieldValue::Boolean(b)) => a.cmp(b),
            (FieldValue::DateTime(a), FieldValue::DateTime(b)) => a.cmp(b),
            (FieldValue::String(a), FieldValue::String(b)) => a.cmp(b),
            (FieldValue::String(_), FieldValue::DateTime(_))
            | (FieldValue::DateTime(_), FieldValue::String(_)) => {
                self.as_text().cmp(&other.as_text())
            }
            (FieldValue::Json(a), FieldValue::Json(b)) => a.to_string().cmp(&b.to_string()),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                compare_numbers(a, b)
            }
            (a, b) => a.kind_rank().cmp(&b.kind_rank()),
        }
    }

    /// Compare two optional values, a missing value being the minimum.
    pub fn cmp_optional(a: Option<&FieldValue>, b: Option<&FieldValue>) -> Ordering {
        match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => a.sort_cmp(b),
        }
    }
}

fn compare_numbers(a: &FieldValue, b: &FieldValue) -> Ordering {
    // Integers compare exactly; widening to f64 loses precision past 2^53.
    if let (FieldValue::Integer(x), FieldValue::Integer(y)) = (a, b) {
        return x.cmp(y);
    }
    let x = a.as_f64().unwrap_or(f64::NAN);
    let y = b.as_f64().unwrap_or(f64::NAN);
    x.total_cmp(&y)
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Boolean(b) => write!(f, "{}", b),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Float(x) => write!(f, "{}", x),
            FieldValue::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            FieldValue::String(s) => write!(f, "{}", s),
            FieldValue::Null => write!(f, "null"),
            FieldValue::Json(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Integer(value as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::DateTime(value)
    }
}
