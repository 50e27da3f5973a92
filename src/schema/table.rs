//! Data-driven schema built from a list of field specifications.

use std::collections::HashMap;

use crate::schema::{
    validate_schema, EnvFallbackMapping, FieldKind, KeyMapping, KeySchema, SchemaError, TypedValue,
};

/// One configuration field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Internal field name (e.g. `log_level`).
    pub name: String,

    /// Remote key, relative to the schema prefix unless it starts with `/`.
    pub key: String,

    /// Environment variable consulted when the remote value is unusable.
    pub env_var: Option<String>,

    pub kind: FieldKind,

    /// Explicit default; the kind's zero value otherwise.
    pub default: Option<TypedValue>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, key: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            env_var: None,
            kind,
            default: None,
        }
    }

    pub fn env(mut self, var: impl Into<String>) -> Self {
        self.env_var = Some(var.into());
        self
    }

    pub fn default_value(mut self, value: impl Into<TypedValue>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// A [`KeySchema`] described entirely by data.
#[derive(Debug, Clone)]
pub struct TableSchema {
    prefix: String,
    key_map: KeyMapping,
    env_map: EnvFallbackMapping,
    kinds: HashMap<String, FieldKind>,
    defaults: HashMap<String, TypedValue>,
}

impl TableSchema {
    /// Build and validate a schema rooted at `prefix`.
    pub fn new(
        prefix: impl Into<String>,
        fields: impl IntoIterator<Item = FieldSpec>,
    ) -> Result<Self, SchemaError> {
        let prefix = prefix.into();
        let fields: Vec<FieldSpec> = fields.into_iter().collect();

        let key_map = KeyMapping::from_pairs(
            fields
                .iter()
                .map(|f| (absolute_key(&prefix, &f.key), f.name.clone())),
        )?;
        let env_map = EnvFallbackMapping::from_pairs(
            fields
                .iter()
                .filter_map(|f| f.env_var.clone().map(|var| (f.name.clone(), var))),
        )?;

        let mut kinds = HashMap::with_capacity(fields.len());
        let mut defaults = HashMap::new();
        for field in fields {
            kinds.insert(field.name.clone(), field.kind);
            if let Some(default) = field.default {
                defaults.insert(field.name, default);
            }
        }

        let schema = Self {
            prefix,
            key_map,
            env_map,
            kinds,
            defaults,
        };
        validate_schema(&schema)?;
        Ok(schema)
    }
}

impl KeySchema for TableSchema {
    fn config_prefix(&self) -> &str {
        &self.prefix
    }

    fn key_map(&self) -> &KeyMapping {
        &self.key_map
    }

    fn env_map(&self) -> &EnvFallbackMapping {
        &self.env_map
    }

    fn field_kind(&self, field: &str) -> Option<FieldKind> {
        self.kinds.get(field).copied()
    }

    fn default_value(&self, field: &str) -> Option<TypedValue> {
        self.defaults.get(field).cloned()
    }
}

fn absolute_key(prefix: &str, key: &str) -> String {
    if key.starts_with('/') {
        key.to_string()
    } else {
        format!("{}/{}", prefix, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("log_level", "LogLevel", FieldKind::Str)
                .env("LOG_LEVEL")
                .default_value("INFO"),
            FieldSpec::new("debug", "Debug", FieldKind::Bool).env("DEBUG"),
            FieldSpec::new("timeout", "Timeout", FieldKind::Float).default_value(30.0),
        ]
    }

    #[test]
    fn test_builds_absolute_keys() {
        let schema = TableSchema::new("/APPS/Svc", fields()).unwrap();
        assert_eq!(schema.key_map().field_for("/APPS/Svc/LogLevel"), Some("log_level"));
        assert_eq!(schema.env_map().env_var("debug"), Some("DEBUG"));
        assert_eq!(schema.env_map().env_var("timeout"), None);
        assert_eq!(schema.key_map().len(), 3);
    }

    #[test]
    fn test_coerce_absent_uses_default() {
        let schema = TableSchema::new("/APPS/Svc", fields()).unwrap();
        assert_eq!(schema.coerce("timeout", None).unwrap(), TypedValue::Float(30.0));
        assert_eq!(schema.coerce("debug", None).unwrap(), TypedValue::Bool(false));
        assert_eq!(schema.coerce("debug", Some("On")).unwrap(), TypedValue::Bool(true));
        assert!(schema.coerce("debug", Some("maybe")).is_err());
        assert!(matches!(
            schema.coerce("nope", Some("1")),
            Err(crate::schema::CoercionError::UnknownField(_))
        ));
    }

    #[test]
    fn test_rejects_duplicate_keys() {
        let mut specs = fields();
        specs.push(FieldSpec::new("other", "LogLevel", FieldKind::Str));
        let err = TableSchema::new("/APPS/Svc", specs).unwrap_err();
        assert_eq!(err, SchemaError::DuplicateKey("/APPS/Svc/LogLevel".into()));
    }

    #[test]
    fn test_rejects_key_outside_prefix() {
        let specs = vec![FieldSpec::new("x", "/elsewhere/X", FieldKind::Str)];
        let err = TableSchema::new("/APPS/Svc", specs).unwrap_err();
        assert!(matches!(err, SchemaError::KeyOutsidePrefix { .. }));
    }

    #[test]
    fn test_rejects_mismatched_default() {
        let specs = vec![FieldSpec::new("n", "N", FieldKind::Int).default_value("ten")];
        let err = TableSchema::new("/APPS/Svc", specs).unwrap_err();
        assert!(matches!(err, SchemaError::DefaultKindMismatch { .. }));
    }

    #[test]
    fn test_rejects_relative_prefix() {
        let err = TableSchema::new("APPS", fields()).unwrap_err();
        assert_eq!(err, SchemaError::InvalidPrefix("APPS".into()));
    }
}
