//! Default coercion policy: raw store strings into typed values.
//!
//! Parsing is locale-independent (`str::parse`). Strings pass through
//! untouched; everything else is trimmed first.

use crate::schema::value::{FieldKind, TypedValue};
use thiserror::Error;

const TRUE_TOKENS: [&str; 5] = ["1", "true", "yes", "y", "on"];
const FALSE_TOKENS: [&str; 6] = ["0", "false", "no", "n", "off", ""];

/// A raw value that does not fit its field's declared type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoercionError {
    #[error("field `{field}` expects {kind}, got {raw:?}")]
    Invalid {
        field: String,
        kind: FieldKind,
        raw: String,
    },

    #[error("field `{0}` is not declared by the schema")]
    UnknownField(String),
}

/// Case-insensitive boolean parsing. `None` for unrecognised tokens.
pub fn parse_bool(raw: &str) -> Option<bool> {
    let lowered = raw.trim().to_ascii_lowercase();
    if TRUE_TOKENS.contains(&lowered.as_str()) {
        Some(true)
    } else if FALSE_TOKENS.contains(&lowered.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Split on commas, trim, drop empty items.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Coerce `raw` into `kind` on behalf of `field`.
pub fn coerce_as(field: &str, kind: FieldKind, raw: &str) -> Result<TypedValue, CoercionError> {
    let invalid = || CoercionError::Invalid {
        field: field.to_string(),
        kind,
        raw: raw.to_string(),
    };

    match kind {
        FieldKind::Str => Ok(TypedValue::Str(raw.to_string())),
        FieldKind::List => Ok(TypedValue::List(parse_list(raw))),
        FieldKind::Bool => parse_bool(raw).map(TypedValue::Bool).ok_or_else(invalid),
        FieldKind::Int => raw
            .trim()
            .parse::<i64>()
            .map(TypedValue::Int)
            .map_err(|_| invalid()),
        FieldKind::Float => match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(TypedValue::Float(value)),
            _ => Err(invalid()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_tokens() {
        assert_eq!(parse_bool("On"), Some(true));
        assert_eq!(parse_bool(" YES "), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool(""), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_unrecognised_bool_is_an_error() {
        let err = coerce_as("debug", FieldKind::Bool, "maybe").unwrap_err();
        assert!(err.to_string().contains("debug"));
        assert!(err.to_string().contains("maybe"));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(coerce_as("n", FieldKind::Int, " 42 ").unwrap(), TypedValue::Int(42));
        assert!(coerce_as("n", FieldKind::Int, "4.2").is_err());
        assert_eq!(coerce_as("t", FieldKind::Float, "30").unwrap(), TypedValue::Float(30.0));
        assert_eq!(coerce_as("t", FieldKind::Float, "2.5").unwrap(), TypedValue::Float(2.5));
        assert!(coerce_as("t", FieldKind::Float, "2,5").is_err());
        assert!(coerce_as("t", FieldKind::Float, "NaN").is_err());
    }

    #[test]
    fn test_strings_pass_through() {
        assert_eq!(
            coerce_as("s", FieldKind::Str, "  padded ").unwrap(),
            TypedValue::Str("  padded ".into())
        );
    }

    #[test]
    fn test_list_parsing() {
        assert_eq!(parse_list("closed, resolved,,  rejected "), vec!["closed", "resolved", "rejected"]);
        assert!(parse_list(" , ").is_empty());
    }
}
