//! Watcher subsystem.
//!
//! # Data Flow
//! ```text
//! connect()
//!     → get_by_keys(all mapped keys)       one round trip
//!     → FallbackResolver::resolve_all      complete snapshot
//!     → SnapshotCache::publish
//!     → watch_prefix(prefix, rev + 1)
//!     → per event: resolve one field, publish successor snapshot
//! on stream end / error / silence:
//!     → close, backoff sleep, start over with a full fetch
//! ```
//!
//! # Design Decisions
//! - One task, one event at a time, in delivery order
//! - A full fetch after every reconnect closes the gap left by missed events
//! - Never gives up; repeated failure only raises the degraded flag

pub mod watcher;

pub use watcher::Watcher;
