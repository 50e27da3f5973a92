//! Settings validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, backoff base <= cap)
//! - Refuse to expose the admin API with the placeholder key
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Settings → Result<(), Vec<ValidationError>>

use std::fmt;

use crate::config::schema::Settings;
use crate::store::credentials::parse_endpoint;

const PLACEHOLDER_API_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

/// One semantic problem, located by its dotted settings path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_settings(settings: &Settings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let store = &settings.store;
    if !store.local_only {
        if store.endpoint.trim().is_empty() {
            errors.push(ValidationError::new(
                "store.endpoint",
                "required unless store.local_only is set",
            ));
        } else if let Err(e) = parse_endpoint(&store.endpoint) {
            errors.push(ValidationError::new("store.endpoint", e.to_string()));
        }
        if store.request_timeout_ms == 0 {
            errors.push(ValidationError::new("store.request_timeout_ms", "must be > 0"));
        }
        if store.username.is_some() != store.password.is_some() {
            errors.push(ValidationError::new(
                "store.username",
                "username and password must be set together",
            ));
        }
    }

    let watch = &settings.watch;
    if watch.initial_fetch_timeout_ms == 0 {
        errors.push(ValidationError::new("watch.initial_fetch_timeout_ms", "must be > 0"));
    }
    if watch.inactivity_timeout_ms == 0 {
        errors.push(ValidationError::new("watch.inactivity_timeout_ms", "must be > 0"));
    }
    if watch.backoff_base_ms == 0 {
        errors.push(ValidationError::new("watch.backoff_base_ms", "must be > 0"));
    }
    if watch.backoff_base_ms > watch.backoff_max_ms {
        errors.push(ValidationError::new(
            "watch.backoff_max_ms",
            format!("must be >= backoff_base_ms ({})", watch.backoff_base_ms),
        ));
    }

    let admin = &settings.admin;
    if admin.enabled {
        if admin.api_key.is_empty() || admin.api_key == PLACEHOLDER_API_KEY {
            errors.push(ValidationError::new(
                "admin.api_key",
                "must be changed before enabling the admin API",
            ));
        }
        if admin.bind_address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(ValidationError::new("admin.bind_address", "not a socket address"));
        }
    }

    let observability = &settings.observability;
    if observability.metrics_enabled
        && observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "not a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> Settings {
        let mut settings = Settings::default();
        settings.store.local_only = true;
        settings
    }

    #[test]
    fn test_local_defaults_are_valid() {
        assert_eq!(validate_settings(&local()), Ok(()));
    }

    #[test]
    fn test_endpoint_required_for_store_mode() {
        let errors = validate_settings(&Settings::default()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "store.endpoint");
    }

    #[test]
    fn test_collects_every_error() {
        let mut settings = local();
        settings.watch.inactivity_timeout_ms = 0;
        settings.watch.backoff_base_ms = 10_000;
        settings.watch.backoff_max_ms = 100;
        settings.admin.enabled = true;

        let errors = validate_settings(&settings).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "watch.inactivity_timeout_ms",
                "watch.backoff_max_ms",
                "admin.api_key"
            ]
        );
    }
}
