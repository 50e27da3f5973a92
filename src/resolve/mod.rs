//! Fallback resolution.
//!
//! # Precedence
//! ```text
//! remote raw value (if present and coercible)
//!     → mapped environment variable (if set and coercible)
//!     → schema default for the field
//!     → zero value of the field's kind (reported as a warning)
//! ```
//!
//! # Design Decisions
//! - Resolution never fails; problems become `ResolveWarning`s
//! - The resolver is pure: logging and health reporting belong to the caller

pub mod env;

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::snapshot::{ConfigSnapshot, FieldEntry};
use crate::schema::{KeySchema, TypedValue};
use crate::store::RangeResponse;

pub use env::{EnvSource, ProcessEnv};

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    Remote,
    Env,
    Default,
    ZeroValue,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueSource::Remote => "remote",
            ValueSource::Env => "env",
            ValueSource::Default => "default",
            ValueSource::ZeroValue => "zero_value",
        }
    }
}

/// Something an operator should know about, but not a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolveWarning {
    /// A raw value was present but did not coerce.
    CoercionFailed {
        field: String,
        source: ValueSource,
        raw: String,
        reason: String,
    },
    /// No remote value, no environment variable, no default.
    Unresolved { field: String },
}

impl ResolveWarning {
    pub fn field(&self) -> &str {
        match self {
            ResolveWarning::CoercionFailed { field, .. } => field,
            ResolveWarning::Unresolved { field } => field,
        }
    }
}

/// Outcome of resolving one field.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub value: TypedValue,
    pub source: ValueSource,
    pub warnings: Vec<ResolveWarning>,
}

/// Turns raw store values into typed values, falling back to the
/// environment and schema defaults.
pub struct FallbackResolver {
    schema: Arc<dyn KeySchema>,
    env: Arc<dyn EnvSource>,
}

impl FallbackResolver {
    pub fn new(schema: Arc<dyn KeySchema>, env: Arc<dyn EnvSource>) -> Self {
        Self { schema, env }
    }

    pub fn resolve(&self, field: &str, raw: Option<&str>) -> Resolved {
        let mut warnings = Vec::new();

        if let Some(raw) = raw {
            match self.schema.coerce(field, Some(raw)) {
                Ok(value) => return resolved(value, ValueSource::Remote, warnings),
                Err(err) => warnings.push(ResolveWarning::CoercionFailed {
                    field: field.to_string(),
                    source: ValueSource::Remote,
                    raw: raw.to_string(),
                    reason: err.to_string(),
                }),
            }
        }

        if let Some(var) = self.schema.env_map().env_var(field) {
            if let Some(raw) = self.env.var(var) {
                match self.schema.coerce(field, Some(&raw)) {
                    Ok(value) => return resolved(value, ValueSource::Env, warnings),
                    Err(err) => warnings.push(ResolveWarning::CoercionFailed {
                        field: field.to_string(),
                        source: ValueSource::Env,
                        raw,
                        reason: err.to_string(),
                    }),
                }
            }
        }

        if let Some(default) = self.schema.default_value(field) {
            return resolved(default, ValueSource::Default, warnings);
        }

        warnings.push(ResolveWarning::Unresolved {
            field: field.to_string(),
        });
        let value = self
            .schema
            .field_kind(field)
            .map(|kind| kind.zero_value())
            .unwrap_or_else(|| TypedValue::Str(String::new()));
        resolved(value, ValueSource::ZeroValue, warnings)
    }

    /// Resolve every mapped field into a complete snapshot.
    ///
    /// With no `response` (store unreachable or local mode) every field comes
    /// from the environment or defaults.
    pub fn resolve_all(
        &self,
        revision: u64,
        response: Option<&RangeResponse>,
    ) -> (ConfigSnapshot, Vec<ResolveWarning>) {
        let store_revision = response.map_or(0, |r| r.revision);
        let mut fields = BTreeMap::new();
        let mut warnings = Vec::new();

        for (key, field) in self.schema.key_map().iter() {
            let kv = response.and_then(|r| r.entries.get(key)).and_then(Option::as_ref);
            let outcome = self.resolve(field, kv.map(|kv| kv.value.as_str()));
            warnings.extend(outcome.warnings);
            fields.insert(
                field.to_string(),
                FieldEntry {
                    value: outcome.value,
                    source: outcome.source,
                    store_revision: kv.map_or(store_revision, |kv| kv.mod_revision),
                },
            );
        }

        (ConfigSnapshot::new(revision, store_revision, fields), warnings)
    }
}

fn resolved(value: TypedValue, source: ValueSource, warnings: Vec<ResolveWarning>) -> Resolved {
    Resolved {
        value,
        source,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, FieldSpec, TableSchema};
    use crate::store::KeyValue;
    use std::collections::HashMap;

    fn schema() -> Arc<dyn KeySchema> {
        Arc::new(
            TableSchema::new(
                "/APPS/Svc",
                vec![
                    FieldSpec::new("workers", "Workers", FieldKind::Int).env("WORKERS"),
                    FieldSpec::new("debug", "Debug", FieldKind::Bool)
                        .env("DEBUG")
                        .default_value(false),
                    FieldSpec::new("name", "Name", FieldKind::Str),
                ],
            )
            .unwrap(),
        )
    }

    fn resolver(env: &[(&str, &str)]) -> FallbackResolver {
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        FallbackResolver::new(schema(), Arc::new(env))
    }

    #[test]
    fn test_remote_wins_over_env() {
        let r = resolver(&[("WORKERS", "9")]);
        let out = r.resolve("workers", Some("5"));
        assert_eq!(out.value, TypedValue::Int(5));
        assert_eq!(out.source, ValueSource::Remote);
        assert!(out.warnings.is_empty());

        let out = r.resolve("workers", None);
        assert_eq!(out.value, TypedValue::Int(9));
        assert_eq!(out.source, ValueSource::Env);
    }

    #[test]
    fn test_bad_remote_falls_through_to_env() {
        let r = resolver(&[("WORKERS", "9")]);
        let out = r.resolve("workers", Some("lots"));
        assert_eq!(out.value, TypedValue::Int(9));
        assert_eq!(out.source, ValueSource::Env);
        assert!(matches!(
            out.warnings.as_slice(),
            [ResolveWarning::CoercionFailed { source: ValueSource::Remote, .. }]
        ));
    }

    #[test]
    fn test_unknown_bool_token_resolves_to_default() {
        let r = resolver(&[]);
        let out = r.resolve("debug", Some("maybe"));
        assert_eq!(out.value, TypedValue::Bool(false));
        assert_eq!(out.source, ValueSource::Default);

        let out = r.resolve("debug", Some("On"));
        assert_eq!(out.value, TypedValue::Bool(true));
    }

    #[test]
    fn test_nothing_anywhere_is_zero_value_with_warning() {
        let r = resolver(&[]);
        let out = r.resolve("workers", None);
        assert_eq!(out.value, TypedValue::Int(0));
        assert_eq!(out.source, ValueSource::ZeroValue);
        assert_eq!(
            out.warnings,
            vec![ResolveWarning::Unresolved { field: "workers".into() }]
        );
    }

    #[test]
    fn test_resolve_all_is_complete() {
        let r = resolver(&[]);
        let mut entries = HashMap::new();
        entries.insert(
            "/APPS/Svc/Workers".to_string(),
            Some(KeyValue {
                value: "4".into(),
                mod_revision: 7,
            }),
        );
        entries.insert("/APPS/Svc/Name".to_string(), None);
        let response = RangeResponse {
            revision: 12,
            entries,
        };

        let (snapshot, warnings) = r.resolve_all(3, Some(&response));
        assert_eq!(snapshot.revision(), 3);
        assert_eq!(snapshot.store_revision(), 12);
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.get_i64("workers"), Some(4));
        assert_eq!(snapshot.field_revision("workers"), Some(7));
        assert_eq!(snapshot.field_revision("name"), Some(12));
        assert_eq!(snapshot.source("debug"), Some(ValueSource::Default));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field(), "name");
    }
}
