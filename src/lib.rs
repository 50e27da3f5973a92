//! Live, typed configuration served from an etcd key prefix.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────────┐    ┌──────────┐    ┌──────────────────┐    ┌───────────────┐
//!   │    store     │───▶│  watch   │───▶│     resolve      │───▶│     cache     │
//!   │ (etcd / mem) │    │ Watcher  │    │ remote→env→dflt  │    │ ArcSwap<Snap> │
//!   └──────────────┘    └────┬─────┘    └──────────────────┘    └───────┬───────┘
//!                            │ state                                    │ read()
//!                            ▼                                          ▼
//!                       ┌──────────┐                          ┌──────────────────┐
//!                       │  health  │─────────────────────────▶│     manager      │◀── callers
//!                       └──────────┘                          │  start / stop    │
//!                                                             └──────────────────┘
//!   Cross-cutting: schema, config, resilience, lifecycle, observability, admin
//! ```
//!
//! ```no_run
//! use std::sync::Arc;
//! use etcd_dynconfig::{ClientCredentials, ConfigManager, EtcdGatewayClient};
//! use etcd_dynconfig::schema::preset;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = Arc::new(preset::control_unit(None, false)?);
//! let manager = ConfigManager::builder(schema)
//!     .store(
//!         Arc::new(EtcdGatewayClient::new(std::time::Duration::from_secs(5))),
//!         ClientCredentials::new("etcd.internal:2379").with_user("svc", "secret"),
//!     )
//!     .build()?;
//!
//! manager.start().await;
//! let level = manager.get_all_configs().get_str("log_level").map(String::from);
//! manager.stop().await;
//! # Ok(())
//! # }
//! ```

// Core subsystems
pub mod cache;
pub mod manager;
pub mod resolve;
pub mod schema;
pub mod store;
pub mod watch;

// Cross-cutting concerns
pub mod admin;
pub mod config;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use cache::ConfigSnapshot;
pub use config::Settings;
pub use health::{HealthReport, SourceMode, WatchState};
pub use lifecycle::shutdown::Shutdown;
pub use manager::{ConfigManager, ConfigManagerBuilder};
pub use resolve::{EnvSource, ValueSource};
pub use schema::{FieldKind, FieldSpec, KeySchema, SchemaError, TableSchema, TypedValue};
pub use store::{ClientCredentials, EtcdGatewayClient, MemoryStore, StoreError};
