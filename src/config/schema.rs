//! Settings schema definitions.
//!
//! All sections derive Serde traits and fill missing fields from `Default`,
//! so an empty file is a valid (local-only) configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root settings for the config manager and its daemon.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Remote store connection.
    pub store: StoreSettings,

    /// Watcher timing.
    pub watch: WatchSettings,

    /// Admin HTTP API.
    pub admin: AdminSettings,

    pub observability: ObservabilitySettings,
}

/// Remote store connection settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StoreSettings {
    /// `host`, `host:port` or URL of the etcd JSON gateway.
    pub endpoint: String,

    pub username: Option<String>,

    pub password: Option<String>,

    /// Prefix under which the application's keys live.
    pub root_key: Option<String>,

    /// PEM bundle used to verify the store's TLS certificate.
    pub ca_cert_path: Option<PathBuf>,

    /// Prepend `/dev` to the root key.
    pub dev: bool,

    /// Skip the store entirely; serve environment and defaults.
    pub local_only: bool,

    /// Bound on each unary store request.
    pub request_timeout_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            username: None,
            password: None,
            root_key: None,
            ca_cert_path: None,
            dev: false,
            local_only: false,
            request_timeout_ms: 5_000,
        }
    }
}

impl StoreSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Watcher timing knobs.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct WatchSettings {
    /// How long `start()` waits for the first fetch.
    pub initial_fetch_timeout_ms: u64,

    /// Silence on the watch stream after which it is presumed dead.
    pub inactivity_timeout_ms: u64,

    pub backoff_base_ms: u64,

    pub backoff_max_ms: u64,

    /// Consecutive failed attempts before health reports degraded.
    pub degraded_after_attempts: u32,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            initial_fetch_timeout_ms: 5_000,
            inactivity_timeout_ms: 600_000,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
            degraded_after_attempts: 5,
        }
    }
}

impl WatchSettings {
    pub fn initial_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.initial_fetch_timeout_ms)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_millis(self.inactivity_timeout_ms)
    }
}

/// Admin API settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminSettings {
    pub enabled: bool,

    /// Bearer token required on every admin request.
    pub api_key: String,

    pub bind_address: String,
}

impl Default for AdminSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Logging and metrics settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilitySettings {
    /// Initial log level; replaced by the `log_level` field once served.
    pub log_level: String,

    /// Emit JSON log lines instead of plain text.
    pub json_logs: bool,

    /// Follow the served `log_level` field.
    pub follow_log_level: bool,

    pub metrics_enabled: bool,

    pub metrics_address: String,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            follow_log_level: true,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
