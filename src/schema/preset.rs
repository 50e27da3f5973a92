//! Built-in schema for the reference ControlUnit service.

use crate::schema::{normalize_prefix, FieldKind, FieldSpec, SchemaError, TableSchema, TypedValue};

/// Prefix used when no root key is configured.
pub const CONTROL_UNIT_ROOT: &str = "/APPS/ControlUnit";

// (field, remote key, kind, default)
const CONTROL_UNIT_FIELDS: &[(&str, &str, FieldKind, Option<PresetDefault>)] = &[
    ("categorization_api_url", "CategorizationApiUrl", FieldKind::Str, None),
    ("categorization_api_token", "CategorizationApiToken", FieldKind::Str, None),
    ("recommendation_api_url", "RecommendationApiUrl", FieldKind::Str, None),
    ("recommendation_api_token", "RecommendationApiToken", FieldKind::Str, None),
    ("csp_message", "CspMessage", FieldKind::Str, None),
    ("csp_message_closed", "CspMessageClosed", FieldKind::Str, None),
    ("csp_message_spam", "CspMessageSpam", FieldKind::Str, None),
    ("spam_count", "SpamCount", FieldKind::Int, None),
    ("log_level", "LogLevel", FieldKind::Str, Some(PresetDefault::Str("INFO"))),
    ("log_sql_level", "LogSqlLevel", FieldKind::Str, Some(PresetDefault::Str("WARNING"))),
    ("log_sql_echo", "LogSqlEcho", FieldKind::Bool, None),
    ("closed_statuses", "ClosedStatuses", FieldKind::List, None),
    ("open_statuses", "OpenStatuses", FieldKind::Str, None),
    ("postgres_dsn", "PostgresDsn", FieldKind::Str, None),
    ("basic_auth_username", "username", FieldKind::Str, None),
    ("basic_auth_password", "password", FieldKind::Str, None),
    ("discord_bot_url", "DiscordBotUrl", FieldKind::Str, None),
    ("discord_bot_api_username", "DiscordBotApiUsername", FieldKind::Str, None),
    ("discord_bot_api_password", "DiscordBotApiPassword", FieldKind::Str, None),
    ("collie_sensitive_url", "CollieSensitiveUrl", FieldKind::Str, None),
    ("collie_password", "ColliePassword", FieldKind::Str, None),
    ("clean_job_frequency_per_day", "CleanJobFrequencyPerDay", FieldKind::Int, None),
    (
        "clean_job_hours_since_last_time_updated",
        "CleanJobHoursSinceLastTimeUpdated",
        FieldKind::Int,
        None,
    ),
    ("cleanup_api_base_url", "CleanupApiBaseUrl", FieldKind::Str, None),
    ("cleanup_source", "CleanupSource", FieldKind::Str, None),
    ("cleanup_start", "CleanupStart", FieldKind::Bool, None),
    ("use_fake_externals_discord", "UseFakeExternalsDiscord", FieldKind::Bool, None),
    ("use_fake_externals_ai", "UseFakeExternalsAi", FieldKind::Bool, None),
    ("ai_categorization_debug", "AiCategorizationDebug", FieldKind::Bool, None),
    ("ai_recommendation_debug", "AiRecommendationDebug", FieldKind::Bool, None),
    ("ai_http_timeout_seconds", "AiHttpTimeoutSeconds", FieldKind::Float, Some(PresetDefault::Float(30.0))),
    ("ai_http_max_connections", "AiHttpMaxConnections", FieldKind::Int, Some(PresetDefault::Int(10))),
    (
        "ai_http_max_keepalive_connections",
        "AiHttpMaxKeepaliveConnections",
        FieldKind::Int,
        Some(PresetDefault::Int(5)),
    ),
];

/// Const-friendly stand-in for `TypedValue` in the field table.
#[derive(Debug, Clone, Copy)]
enum PresetDefault {
    Str(&'static str),
    Int(i64),
    Float(f64),
}

impl From<PresetDefault> for TypedValue {
    fn from(value: PresetDefault) -> Self {
        match value {
            PresetDefault::Str(s) => TypedValue::Str(s.to_string()),
            PresetDefault::Int(i) => TypedValue::Int(i),
            PresetDefault::Float(f) => TypedValue::Float(f),
        }
    }
}

/// ControlUnit schema rooted at `root_key` (or [`CONTROL_UNIT_ROOT`]).
///
/// Every field falls back to the upper-cased field name as its environment
/// variable, e.g. `log_level` → `LOG_LEVEL`.
pub fn control_unit(root_key: Option<&str>, dev: bool) -> Result<TableSchema, SchemaError> {
    let prefix = normalize_prefix(root_key, CONTROL_UNIT_ROOT, dev);
    let fields = CONTROL_UNIT_FIELDS.iter().map(|(name, key, kind, default)| {
        let spec = FieldSpec::new(*name, *key, *kind).env(name.to_ascii_uppercase());
        match default {
            Some(default) => spec.default_value(*default),
            None => spec,
        }
    });
    TableSchema::new(prefix, fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::KeySchema;

    #[test]
    fn test_preset_is_valid() {
        let schema = control_unit(None, false).unwrap();
        assert_eq!(schema.config_prefix(), CONTROL_UNIT_ROOT);
        assert_eq!(schema.key_map().len(), 33);
        assert_eq!(schema.env_map().len(), 33);
        assert!(schema.key_map().keys().any(|k| k.ends_with("/CategorizationApiUrl")));
        assert_eq!(schema.env_map().env_var("log_level"), Some("LOG_LEVEL"));
    }

    #[test]
    fn test_preset_numeric_defaults() {
        let schema = control_unit(None, false).unwrap();
        assert_eq!(
            schema.coerce("ai_http_timeout_seconds", None).unwrap(),
            TypedValue::Float(30.0)
        );
        assert_eq!(
            schema.coerce("ai_http_max_connections", None).unwrap(),
            TypedValue::Int(10)
        );
        assert_eq!(
            schema.coerce("ai_http_max_keepalive_connections", None).unwrap(),
            TypedValue::Int(5)
        );
        assert_eq!(
            schema.coerce("closed_statuses", Some("closed, done")).unwrap(),
            TypedValue::List(vec!["closed".into(), "done".into()])
        );
    }

    #[test]
    fn test_dev_prefix() {
        let schema = control_unit(Some("APPS/Custom/"), true).unwrap();
        assert_eq!(schema.config_prefix(), "/dev/APPS/Custom");
        assert!(schema.key_map().keys().all(|k| k.starts_with("/dev/APPS/Custom/")));
    }
}
