//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Watcher session fails
//!     → Backoff::next_delay() (exponential, capped, jittered)
//!     → sleep, cancellable by shutdown
//!     → successful full fetch → Backoff::reset()
//! ```
//!
//! # Design Decisions
//! - Retry forever; the attempt count only feeds the degraded flag
//! - Jitter spreads reconnects from many instances after a store outage

pub mod backoff;

pub use backoff::{calculate_backoff, Backoff};
