//! Runtime value types bound into scope templates and compared by filters.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A runtime value that can be bound to a template variable or appear as a
/// literal inside a filter expression.
///
/// Arrays are typed (`Int64Array`, `StringArray`) so that materialized id
/// sets keep their element type when rendered into an `IN ( ... )` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit floating point.
    Float64(f64),
    /// UTF-8 string.
    String(String),
    /// Array of 64-bit integers.
    Int64Array(Vec<i64>),
    /// Array of strings.
    StringArray(Vec<String>),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value is an array type.
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Int64Array(_) | Value::StringArray(_))
    }

    /// Check if this value is an array without elements.
    pub fn is_empty_array(&self) -> bool {
        match self {
            Value::Int64Array(v) => v.is_empty(),
            Value::StringArray(v) => v.is_empty(),
            _ => false,
        }
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Expand this value into its scalar elements.
    ///
    /// Scalars yield themselves; arrays yield one value per element.
    pub fn elements(&self) -> Vec<Value> {
        match self {
            Value::Int64Array(v) => v.iter().copied().map(Value::Int64).collect(),
            Value::StringArray(v) => v.iter().cloned().map(Value::String).collect(),
            other => vec![other.clone()],
        }
    }

    /// SQL equality between two scalars.
    ///
    /// Returns `None` when either side is null (unknown in three-valued logic).
    pub fn sql_eq(&self, other: &Value) -> Option<bool> {
        if self.is_null() || other.is_null() {
            return None;
        }
        Some(self.sql_cmp(other) == Some(Ordering::Equal))
    }

    /// Compare two scalars, returning their ordering if comparable.
    pub fn sql_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int64(a), Value::Int64(b)) => Some(a.cmp(b)),
            (Value::Float64(a), Value::Float64(b)) => a.partial_cmp(b),
            (Value::Int64(a), Value::Float64(b)) => (*a as f64).partial_cmp(b),
            (Value::Float64(a), Value::Int64(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

fn write_string_literal(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "'{}'", s.replace('\'', "''"))
}

/// Renders the value as a SQL literal.
///
/// Arrays render as a comma-separated literal list (without parentheses);
/// an empty array renders as `NULL`, which never matches in an `IN` list.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(true) => write!(f, "TRUE"),
            Value::Bool(false) => write!(f, "FALSE"),
            Value::Int64(i) => write!(f, "{i}"),
            Value::Float64(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{x:.1}"),
            Value::Float64(x) => write!(f, "{x}"),
            Value::String(s) => write_string_literal(f, s),
            Value::Int64Array(v) if v.is_empty() => write!(f, "NULL"),
            Value::Int64Array(v) => {
                let parts: Vec<String> = v.iter().map(|i| i.to_string()).collect();
                write!(f, "{}", parts.join(", "))
            }
            Value::StringArray(v) if v.is_empty() => write!(f, "NULL"),
            Value::StringArray(v) => {
                for (i, s) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write_string_literal(f, s)?;
                }
                Ok(())
            }
        }
    }
}

// Conversion implementations
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int64(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Value::Int64Array(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::StringArray(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        assert!(Value::Null.is_null());
        assert!(!Value::Bool(true).is_null());

        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int64(100).as_i64(), Some(100));
        assert_eq!(Value::String("hello".into()).as_str(), Some("hello"));
        assert!(Value::Int64Array(vec![]).is_empty_array());
        assert!(!Value::Int64(1).is_empty_array());
    }

    #[test]
    fn test_value_conversions() {
        let v: Value = 42i32.into();
        assert_eq!(v, Value::Int64(42));

        let v: Value = None::<i64>.into();
        assert_eq!(v, Value::Null);

        let v: Value = vec![1i64, 2, 3].into();
        assert!(v.is_array());
    }

    #[test]
    fn test_sql_literal_rendering() {
        assert_eq!(Value::Int64(-1).to_string(), "-1");
        assert_eq!(Value::Float64(2.0).to_string(), "2.0");
        assert_eq!(Value::String("o'brien".into()).to_string(), "'o''brien'");
        assert_eq!(Value::Int64Array(vec![1, 2, 3]).to_string(), "1, 2, 3");
        assert_eq!(
            Value::StringArray(vec!["a".into(), "b".into()]).to_string(),
            "'a', 'b'"
        );
        assert_eq!(Value::Int64Array(vec![]).to_string(), "NULL");
    }

    #[test]
    fn test_sql_equality_is_unknown_on_null() {
        assert_eq!(Value::Int64(1).sql_eq(&Value::Int64(1)), Some(true));
        assert_eq!(Value::Int64(1).sql_eq(&Value::Float64(1.0)), Some(true));
        assert_eq!(Value::Int64(1).sql_eq(&Value::String("1".into())), Some(false));
        assert_eq!(Value::Null.sql_eq(&Value::Null), None);
    }

    #[test]
    fn test_untagged_json() {
        let v: Value = serde_json::from_str("[10, 20]").unwrap();
        assert_eq!(v, Value::Int64Array(vec![10, 20]));
        let v: Value = serde_json::from_str("\"u123\"").unwrap();
        assert_eq!(v, Value::String("u123".into()));
        let v: Value = serde_json::from_str("null").unwrap();
        assert_eq!(v, Value::Null);
    }
}
