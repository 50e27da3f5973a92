//! Settings loading from disk and the environment.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::schema::Settings;
use crate::config::validation::{validate_settings, ValidationError};
use crate::resolve::EnvSource;
use crate::schema::coerce::parse_bool;

pub const ENV_HOST_NAME: &str = "EtcdSettings__HostName";
pub const ENV_USER_NAME: &str = "EtcdSettings__UserName";
pub const ENV_PASSWORD: &str = "EtcdSettings__Password";
pub const ENV_ROOT_KEY: &str = "EtcdSettings__RootKey";
pub const ENV_CA_CERT_PATH: &str = "EtcdSettings__CaCertPath";
pub const ENV_DEV: &str = "EtcdSettings__Dev";
pub const ENV_USE_LOCAL_CONFIG: &str = "USE_LOCAL_CONFIG";

/// Error type for settings loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{var} is not a boolean: {value:?}")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load settings from an optional TOML file, overlay the environment, then
/// validate.
pub fn load_settings(path: Option<&Path>, env: &dyn EnvSource) -> Result<Settings, ConfigError> {
    let mut settings = match path {
        Some(path) => parse_settings(&fs::read_to_string(path)?)?,
        None => Settings::default(),
    };
    apply_env_overrides(&mut settings, env)?;
    validate_settings(&settings).map_err(ConfigError::Validation)?;
    Ok(settings)
}

/// Parse TOML without validating.
pub fn parse_settings(content: &str) -> Result<Settings, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Overlay the deployment environment variables. Set variables win over the
/// file; blank ones are ignored.
pub fn apply_env_overrides(settings: &mut Settings, env: &dyn EnvSource) -> Result<(), ConfigError> {
    let var = |name: &str| env.var(name).filter(|v| !v.trim().is_empty());

    if let Some(host) = var(ENV_HOST_NAME) {
        settings.store.endpoint = host;
    }
    if let Some(user) = var(ENV_USER_NAME) {
        settings.store.username = Some(user);
    }
    if let Some(password) = var(ENV_PASSWORD) {
        settings.store.password = Some(password);
    }
    if let Some(root) = var(ENV_ROOT_KEY) {
        settings.store.root_key = Some(root);
    }
    if let Some(path) = var(ENV_CA_CERT_PATH) {
        settings.store.ca_cert_path = Some(PathBuf::from(path));
    }
    if let Some(dev) = var(ENV_DEV) {
        settings.store.dev = env_bool(ENV_DEV, &dev)?;
    }
    if let Some(local) = var(ENV_USE_LOCAL_CONFIG) {
        settings.store.local_only = env_bool(ENV_USE_LOCAL_CONFIG, &local)?;
    }
    Ok(())
}

fn env_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::Env {
        var,
        value: value.to_string(),
    })
}
