//! Health reporting subsystem.
//!
//! # Data Flow
//! ```text
//! Watcher
//!     → set_phase / set_degraded / record_sync (state.rs)
//!     → push_warning for resolver warnings
//! ConfigManager::health()
//!     → HealthReport (plain data, serialisable for the admin API)
//! ```
//!
//! # Design Decisions
//! - Reads never block the watcher
//! - The report is a copy; holding it pins nothing

pub mod state;

use serde::{Serialize, Serializer};
use std::time::SystemTime;

use crate::cache::snapshot::unix_millis;
use crate::resolve::ResolveWarning;

pub use state::{HealthState, WatchState};

/// Where values come from for this manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    Store,

    /// Environment and defaults only; no store connection.
    LocalOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub state: WatchState,
    pub degraded: bool,
    pub mode: SourceMode,
    pub running: bool,
    #[serde(rename = "last_successful_sync_ms", serialize_with = "serialize_millis")]
    pub last_successful_sync: Option<SystemTime>,
    pub revision: u64,
    pub store_revision: u64,
    pub reconnect_attempts: u32,
    pub warnings: Vec<ResolveWarning>,
}

fn serialize_millis<S: Serializer>(at: &Option<SystemTime>, s: S) -> Result<S::Ok, S::Error> {
    match at {
        Some(at) => s.serialize_some(&unix_millis(*at)),
        None => s.serialize_none(),
    }
}
