//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber (plain or JSON lines)
//! - Change the log level at runtime through a reload handle
//!
//! # Design Decisions
//! - `RUST_LOG` wins at startup; runtime changes replace it
//! - Level names from other ecosystems (WARNING, CRITICAL) are accepted

use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::Subscriber;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("unknown log level {0:?}")]
    InvalidLevel(String),

    #[error("cannot reload log filter: {0}")]
    Reload(String),

    #[error("cannot install subscriber: {0}")]
    Init(String),
}

/// Map a level name onto a `tracing` level directive.
pub fn normalize_level(level: &str) -> Option<&'static str> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" | "notset" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" | "critical" | "fatal" => Some("error"),
        "off" => Some("off"),
        _ => None,
    }
}

/// Handle on the installed level filter.
pub struct LogHandle {
    handle: reload::Handle<EnvFilter, Registry>,
    current: Mutex<String>,
}

impl LogHandle {
    /// The active directive.
    pub fn current(&self) -> String {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Switch to `level`. Returns `false` when it is already active.
    pub fn apply_level(&self, level: &str) -> Result<bool, LoggingError> {
        let directive =
            normalize_level(level).ok_or_else(|| LoggingError::InvalidLevel(level.to_string()))?;
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_str() == directive {
            return Ok(false);
        }
        let filter = EnvFilter::try_new(directive)
            .map_err(|e| LoggingError::Reload(e.to_string()))?;
        self.handle
            .reload(filter)
            .map_err(|e| LoggingError::Reload(e.to_string()))?;
        tracing::info!(from = %*current, to = directive, "Log level changed");
        *current = directive.to_string();
        Ok(true)
    }
}

/// Build the subscriber without installing it.
pub fn build_subscriber(
    level: &str,
    json: bool,
) -> Result<(impl Subscriber + Send + Sync + 'static, LogHandle), LoggingError> {
    let (filter, current) = match EnvFilter::try_from_default_env() {
        Ok(filter) => {
            let current = filter.to_string();
            (filter, current)
        }
        Err(_) => {
            let directive = normalize_level(level)
                .ok_or_else(|| LoggingError::InvalidLevel(level.to_string()))?;
            let filter = EnvFilter::try_new(directive)
                .map_err(|e| LoggingError::Init(e.to_string()))?;
            (filter, directive.to_string())
        }
    };
    let (filter, handle) = reload::Layer::new(filter);

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer));

    let handle = LogHandle {
        handle,
        current: Mutex::new(current),
    };
    Ok((subscriber, handle))
}

/// Install the global subscriber.
pub fn init_logging(level: &str, json: bool) -> Result<LogHandle, LoggingError> {
    let (subscriber, handle) = build_subscriber(level, json)?;
    subscriber
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;
    Ok(handle)
}
