//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     stop() or drop → trigger → every ShutdownSignal wakes
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → daemon stops the manager and servers
//! ```
//!
//! # Design Decisions
//! - One shutdown flag per watcher; waiting on it is cancellation-safe
//! - Dropping the coordinator counts as a trigger, so no task outlives its owner

pub mod shutdown;
pub mod signals;
