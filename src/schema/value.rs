//! Typed configuration values and their declared kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Bool,
    Int,
    Float,
    Str,
    /// Comma-separated list of strings.
    List,
}

impl FieldKind {
    /// The value a field of this kind resolves to when nothing else is available.
    pub fn zero_value(self) -> TypedValue {
        match self {
            FieldKind::Bool => TypedValue::Bool(false),
            FieldKind::Int => TypedValue::Int(0),
            FieldKind::Float => TypedValue::Float(0.0),
            FieldKind::Str => TypedValue::Str(String::new()),
            FieldKind::List => TypedValue::List(Vec::new()),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::Bool => "bool",
            FieldKind::Int => "int",
            FieldKind::Float => "float",
            FieldKind::Str => "string",
            FieldKind::List => "list",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A coerced configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypedValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<String>),
}

impl TypedValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            TypedValue::Bool(_) => FieldKind::Bool,
            TypedValue::Int(_) => FieldKind::Int,
            TypedValue::Float(_) => FieldKind::Float,
            TypedValue::Str(_) => FieldKind::Str,
            TypedValue::List(_) => FieldKind::List,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TypedValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TypedValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Floats, and integers widened to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TypedValue::Float(f) => Some(*f),
            TypedValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            TypedValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Bool(b) => write!(f, "{}", b),
            TypedValue::Int(i) => write!(f, "{}", i),
            TypedValue::Float(v) => write!(f, "{}", v),
            TypedValue::Str(s) => f.write_str(s),
            TypedValue::List(items) => f.write_str(&items.join(",")),
        }
    }
}

impl From<bool> for TypedValue {
    fn from(value: bool) -> Self {
        TypedValue::Bool(value)
    }
}

impl From<i64> for TypedValue {
    fn from(value: i64) -> Self {
        TypedValue::Int(value)
    }
}

impl From<f64> for TypedValue {
    fn from(value: f64) -> Self {
        TypedValue::Float(value)
    }
}

impl From<&str> for TypedValue {
    fn from(value: &str) -> Self {
        TypedValue::Str(value.to_string())
    }
}

impl From<String> for TypedValue {
    fn from(value: String) -> Self {
        TypedValue::Str(value)
    }
}

impl From<Vec<String>> for TypedValue {
    fn from(value: Vec<String>) -> Self {
        TypedValue::List(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_values_match_kind() {
        for kind in [
            FieldKind::Bool,
            FieldKind::Int,
            FieldKind::Float,
            FieldKind::Str,
            FieldKind::List,
        ] {
            assert_eq!(kind.zero_value().kind(), kind);
        }
    }

    #[test]
    fn test_untagged_json() {
        let json = serde_json::to_string(&TypedValue::List(vec!["a".into(), "b".into()])).unwrap();
        assert_eq!(json, r#"["a","b"]"#);
        assert_eq!(serde_json::to_string(&TypedValue::Int(5)).unwrap(), "5");

        let parsed: TypedValue = serde_json::from_str("5").unwrap();
        assert_eq!(parsed, TypedValue::Int(5));
        let parsed: TypedValue = serde_json::from_str("2.5").unwrap();
        assert_eq!(parsed, TypedValue::Float(2.5));
    }

    #[test]
    fn test_int_widens_to_float() {
        assert_eq!(TypedValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(TypedValue::Str("3".into()).as_f64(), None);
    }
}
