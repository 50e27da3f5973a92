//! Watcher state machine bookkeeping.
//!
//! # States
//! - Stopped: no watcher task
//! - Connecting: first connect + full fetch in progress
//! - Watching: stream open, events being applied
//! - Reconnecting: stream lost, backing off before the next attempt
//!
//! # State Transitions
//! ```text
//! Stopped → Connecting: start()
//! Connecting → Watching: first fetch published
//! Watching → Reconnecting: stream ended, errored, or went silent
//! Reconnecting → Watching: reconnect + full fetch published
//! * → Stopped: stop()
//! ```
//!
//! # Design Decisions
//! - Degraded is a flag on Connecting/Reconnecting, not a separate phase
//! - Written only by the watcher; read lock-free by any caller
//! - Warnings kept in a bounded ring, oldest dropped first

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::info;

use crate::resolve::ResolveWarning;

const WARNING_CAPACITY: usize = 64;

/// Externally visible watcher state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum WatchState {
    Stopped = 0,
    Connecting = 1,
    Watching = 2,
    Reconnecting = 3,

    /// Connecting or Reconnecting past the configured attempt count.
    Degraded = 4,
}

impl WatchState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => WatchState::Connecting,
            2 => WatchState::Watching,
            3 => WatchState::Reconnecting,
            4 => WatchState::Degraded,
            _ => WatchState::Stopped,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WatchState::Stopped => "stopped",
            WatchState::Connecting => "connecting",
            WatchState::Watching => "watching",
            WatchState::Reconnecting => "reconnecting",
            WatchState::Degraded => "degraded",
        }
    }
}

impl std::fmt::Display for WatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared between the watcher (writer) and the manager (reader).
#[derive(Debug, Default)]
pub struct HealthState {
    phase: AtomicU8,
    degraded: AtomicBool,
    reconnect_attempts: AtomicU32,
    /// Unix millis of the last successful full fetch; 0 when never.
    last_sync_ms: AtomicU64,
    warnings: Mutex<VecDeque<ResolveWarning>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The raw phase, ignoring the degraded qualifier.
    pub fn phase(&self) -> WatchState {
        WatchState::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Phase with the degraded qualifier applied.
    pub fn state(&self) -> WatchState {
        match self.phase() {
            WatchState::Connecting | WatchState::Reconnecting if self.is_degraded() => {
                WatchState::Degraded
            }
            phase => phase,
        }
    }

    pub fn set_phase(&self, next: WatchState) {
        let prev = WatchState::from_u8(self.phase.swap(next as u8, Ordering::AcqRel));
        if prev != next {
            info!(from = %prev, to = %next, "Watch state changed");
        }
        if next == WatchState::Stopped {
            self.degraded.store(false, Ordering::Release);
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    pub fn set_degraded(&self, degraded: bool) {
        self.degraded.store(degraded, Ordering::Release);
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Acquire)
    }

    pub fn set_reconnect_attempts(&self, attempts: u32) {
        self.reconnect_attempts.store(attempts, Ordering::Release);
    }

    pub fn record_sync(&self, at: SystemTime) {
        let ms = at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.last_sync_ms.store(ms.max(1), Ordering::Release);
    }

    pub fn last_successful_sync(&self) -> Option<SystemTime> {
        match self.last_sync_ms.load(Ordering::Acquire) {
            0 => None,
            ms => Some(UNIX_EPOCH + Duration::from_millis(ms)),
        }
    }

    pub fn push_warning(&self, warning: ResolveWarning) {
        let mut warnings = self.warnings.lock().unwrap_or_else(PoisonError::into_inner);
        if warnings.len() == WARNING_CAPACITY {
            warnings.pop_front();
        }
        warnings.push_back(warning);
    }

    /// Oldest first.
    pub fn warnings(&self) -> Vec<ResolveWarning> {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degraded_qualifies_reconnecting_only() {
        let health = HealthState::new();
        assert_eq!(health.state(), WatchState::Stopped);

        health.set_phase(WatchState::Reconnecting);
        health.set_degraded(true);
        assert_eq!(health.phase(), WatchState::Reconnecting);
        assert_eq!(health.state(), WatchState::Degraded);

        health.set_phase(WatchState::Watching);
        assert_eq!(health.state(), WatchState::Watching);

        health.set_phase(WatchState::Stopped);
        assert!(!health.is_degraded());
    }

    #[test]
    fn test_warning_ring_is_bounded() {
        let health = HealthState::new();
        for i in 0..(WARNING_CAPACITY + 6) {
            health.push_warning(ResolveWarning::Unresolved {
                field: format!("f{}", i),
            });
        }
        let warnings = health.warnings();
        assert_eq!(warnings.len(), WARNING_CAPACITY);
        assert_eq!(warnings[0].field(), "f6");
    }

    #[test]
    fn test_last_sync_round_trips() {
        let health = HealthState::new();
        assert!(health.last_successful_sync().is_none());
        let now = SystemTime::now();
        health.record_sync(now);
        let seen = health.last_successful_sync().unwrap();
        let drift = now.duration_since(seen).unwrap_or_default();
        assert!(drift < Duration::from_millis(1));
    }
}
