//! Key schema subsystem.
//!
//! # Data Flow
//! ```text
//! KeySchema (supplied by the application)
//!     → key_map():  remote key  → field name
//!     → env_map():  field name  → environment variable
//!     → coerce():   raw string  → TypedValue
//!     → validate_schema() at manager construction (fatal on error)
//! ```
//!
//! # Design Decisions
//! - Schemas are data plus a coercion policy, injected as `Arc<dyn KeySchema>`
//! - `TableSchema` covers most applications without a custom impl
//! - Mappings are immutable once the schema is built

pub mod coerce;
pub mod preset;
pub mod table;
pub mod value;

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

pub use coerce::CoercionError;
pub use table::{FieldSpec, TableSchema};
pub use value::{FieldKind, TypedValue};

/// A schema that cannot be served. Always a programming error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("config prefix must be a non-empty absolute path, got {0:?}")]
    InvalidPrefix(String),

    #[error("remote key {0:?} is mapped more than once")]
    DuplicateKey(String),

    #[error("field `{0}` is mapped from more than one remote key")]
    DuplicateField(String),

    #[error("field `{0}` has more than one environment fallback")]
    DuplicateEnvField(String),

    #[error("remote key {key:?} lies outside prefix {prefix:?}")]
    KeyOutsidePrefix { key: String, prefix: String },

    #[error("environment fallback references unmapped field `{0}`")]
    UnmappedEnvField(String),

    #[error("field `{0}` has no declared kind")]
    UndeclaredField(String),

    #[error("default for field `{field}` is {actual}, expected {expected}")]
    DefaultKindMismatch {
        field: String,
        expected: FieldKind,
        actual: FieldKind,
    },
}

/// Remote key path → internal field name. Both sides are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMapping {
    by_key: BTreeMap<String, String>,
}

impl KeyMapping {
    pub fn from_pairs<I, K, F>(pairs: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (K, F)>,
        K: Into<String>,
        F: Into<String>,
    {
        let mut by_key = BTreeMap::new();
        let mut fields = BTreeSet::new();
        for (key, field) in pairs {
            let key = key.into();
            let field = field.into();
            if !fields.insert(field.clone()) {
                return Err(SchemaError::DuplicateField(field));
            }
            if by_key.contains_key(&key) {
                return Err(SchemaError::DuplicateKey(key));
            }
            by_key.insert(key, field);
        }
        Ok(Self { by_key })
    }

    pub fn field_for(&self, key: &str) -> Option<&str> {
        self.by_key.get(key).map(String::as_str)
    }

    pub fn key_for(&self, field: &str) -> Option<&str> {
        self.by_key
            .iter()
            .find(|(_, f)| f.as_str() == field)
            .map(|(k, _)| k.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.by_key.keys().map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.by_key.values().map(String::as_str)
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.by_key.values().any(|f| f == field)
    }

    /// `(remote key, field)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_key.iter().map(|(k, f)| (k.as_str(), f.as_str()))
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// Internal field name → environment variable name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFallbackMapping {
    by_field: BTreeMap<String, String>,
}

impl EnvFallbackMapping {
    pub fn from_pairs<I, F, V>(pairs: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (F, V)>,
        F: Into<String>,
        V: Into<String>,
    {
        let mut by_field = BTreeMap::new();
        for (field, var) in pairs {
            let field = field.into();
            if by_field.contains_key(&field) {
                return Err(SchemaError::DuplicateEnvField(field));
            }
            by_field.insert(field, var.into());
        }
        Ok(Self { by_field })
    }

    pub fn env_var(&self, field: &str) -> Option<&str> {
        self.by_field.get(field).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_field.iter().map(|(f, v)| (f.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.by_field.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_field.is_empty()
    }
}

/// Capability set an application supplies to describe its configuration.
pub trait KeySchema: Send + Sync {
    /// Store prefix watched for changes, e.g. `/APPS/MyService`.
    fn config_prefix(&self) -> &str;

    fn key_map(&self) -> &KeyMapping;

    fn env_map(&self) -> &EnvFallbackMapping;

    /// Declared type of `field`, `None` if the schema does not know it.
    fn field_kind(&self, field: &str) -> Option<FieldKind>;

    /// Explicit default for `field`. Fields without one fall back to the
    /// zero value of their kind.
    fn default_value(&self, _field: &str) -> Option<TypedValue> {
        None
    }

    /// Turn a raw value into a typed one. An absent value yields the field's
    /// default rather than an error.
    fn coerce(&self, field: &str, raw: Option<&str>) -> Result<TypedValue, CoercionError> {
        let kind = self
            .field_kind(field)
            .ok_or_else(|| CoercionError::UnknownField(field.to_string()))?;
        match raw {
            Some(raw) => coerce::coerce_as(field, kind, raw),
            None => Ok(self
                .default_value(field)
                .unwrap_or_else(|| kind.zero_value())),
        }
    }
}

/// Check the invariants every served schema must hold.
pub fn validate_schema(schema: &dyn KeySchema) -> Result<(), SchemaError> {
    let prefix = schema.config_prefix();
    if prefix.is_empty() || !prefix.starts_with('/') {
        return Err(SchemaError::InvalidPrefix(prefix.to_string()));
    }

    for (key, field) in schema.key_map().iter() {
        if !key.starts_with(prefix) {
            return Err(SchemaError::KeyOutsidePrefix {
                key: key.to_string(),
                prefix: prefix.to_string(),
            });
        }
        let kind = schema
            .field_kind(field)
            .ok_or_else(|| SchemaError::UndeclaredField(field.to_string()))?;
        if let Some(default) = schema.default_value(field) {
            if default.kind() != kind {
                return Err(SchemaError::DefaultKindMismatch {
                    field: field.to_string(),
                    expected: kind,
                    actual: default.kind(),
                });
            }
        }
    }

    for (field, _) in schema.env_map().iter() {
        if !schema.key_map().contains_field(field) {
            return Err(SchemaError::UnmappedEnvField(field.to_string()));
        }
    }

    Ok(())
}

/// Normalise a root key into a config prefix: trimmed, leading `/`, no
/// trailing `/`, and `/dev` in front when `dev` is set.
pub fn normalize_prefix(root_key: Option<&str>, fallback: &str, dev: bool) -> String {
    let root = root_key
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(fallback)
        .trim();
    let mut root = if root.starts_with('/') {
        root.to_string()
    } else {
        format!("/{}", root)
    };
    while root.len() > 1 && root.ends_with('/') {
        root.pop();
    }
    if dev {
        format!("/dev{}", root)
    } else {
        root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping_rejects_duplicates() {
        let err = KeyMapping::from_pairs([("/a/x", "x"), ("/a/x", "y")]).unwrap_err();
        assert_eq!(err, SchemaError::DuplicateKey("/a/x".into()));

        let err = KeyMapping::from_pairs([("/a/x", "x"), ("/a/y", "x")]).unwrap_err();
        assert_eq!(err, SchemaError::DuplicateField("x".into()));
    }

    #[test]
    fn test_key_mapping_lookup() {
        let map = KeyMapping::from_pairs([("/a/LogLevel", "log_level")]).unwrap();
        assert_eq!(map.field_for("/a/LogLevel"), Some("log_level"));
        assert_eq!(map.key_for("log_level"), Some("/a/LogLevel"));
        assert_eq!(map.field_for("/a/Other"), None);
        assert!(map.contains_field("log_level"));
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix(None, "/APPS/Svc", false), "/APPS/Svc");
        assert_eq!(normalize_prefix(Some(" APPS/Svc/ "), "/x", false), "/APPS/Svc");
        assert_eq!(normalize_prefix(Some("/APPS/Svc"), "/x", true), "/dev/APPS/Svc");
        assert_eq!(normalize_prefix(Some("  "), "/APPS/Svc", false), "/APPS/Svc");
    }
}
