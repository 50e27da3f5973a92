//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use etcd_dynconfig::config::WatchSettings;
use etcd_dynconfig::resolve::EnvSource;
use etcd_dynconfig::schema::{FieldKind, FieldSpec, KeySchema, TableSchema};
use etcd_dynconfig::{ClientCredentials, ConfigManager, MemoryStore};

pub const PREFIX: &str = "/APPS/Svc";
pub const WORKERS_KEY: &str = "/APPS/Svc/Workers";
pub const NAME_KEY: &str = "/APPS/Svc/Name";
pub const DEBUG_KEY: &str = "/APPS/Svc/Debug";

/// Four fields covering every fallback path.
pub fn schema() -> Arc<dyn KeySchema> {
    Arc::new(
        TableSchema::new(
            PREFIX,
            vec![
                FieldSpec::new("workers", "Workers", FieldKind::Int)
                    .env("WORKERS")
                    .default_value(2i64),
                FieldSpec::new("name", "Name", FieldKind::Str).env("NAME"),
                FieldSpec::new("debug", "Debug", FieldKind::Bool).default_value(false),
                FieldSpec::new("ratio", "Ratio", FieldKind::Float),
            ],
        )
        .unwrap(),
    )
}

pub fn env(pairs: &[(&str, &str)]) -> Arc<dyn EnvSource> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Arc::new(map)
}

/// Short timings so reconnect paths finish in milliseconds.
pub fn fast_watch() -> WatchSettings {
    WatchSettings {
        initial_fetch_timeout_ms: 1_000,
        inactivity_timeout_ms: 60_000,
        backoff_base_ms: 10,
        backoff_max_ms: 50,
        degraded_after_attempts: 3,
    }
}

pub fn manager(store: &MemoryStore, env: Arc<dyn EnvSource>) -> ConfigManager {
    manager_with(store, ClientCredentials::new("mem"), env, fast_watch())
}

pub fn manager_with(
    store: &MemoryStore,
    credentials: ClientCredentials,
    env: Arc<dyn EnvSource>,
    settings: WatchSettings,
) -> ConfigManager {
    ConfigManager::builder(schema())
        .store(Arc::new(store.clone()), credentials)
        .env(env)
        .watch_settings(settings)
        .build()
        .unwrap()
}

/// Poll `check` until it holds or five seconds pass.
pub async fn wait_until<F>(what: &str, mut check: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Run `fut` with a five second ceiling.
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("operation timed out")
}
