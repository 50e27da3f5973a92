//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Watcher, resolver, manager produce:
//!     → tracing events (structured fields)
//!     → metrics.rs (counters, gauges)
//!
//! Daemon installs:
//!     → logging.rs (subscriber with a reloadable level filter)
//!     → metrics.rs (Prometheus scrape endpoint)
//! ```
//!
//! # Design Decisions
//! - The library only emits; installing subscribers/recorders is the binary's job
//! - Log level can follow the served `log_level` field without a restart
//! - Metrics are cheap (atomic increments) and no-ops without a recorder

pub mod logging;
pub mod metrics;
