//! Config manager façade.
//!
//! # Data Flow
//! ```text
//! ConfigManager::builder(schema)
//!     → validate_schema (fatal on error)
//!     → fallback-only placeholder published at revision 0
//! start()
//!     → local mode: resolve env/defaults once, publish
//!     → store mode: spawn Watcher, wait (bounded) for the first fetch
//! get_all_configs() / get() / health()
//!     → lock-free reads of the cache and health state
//! stop()
//!     → trigger shutdown, join the watcher
//! ```
//!
//! # Design Decisions
//! - Explicit instances; no process-wide singleton
//! - Reads never touch the network and never wait on the watcher
//! - Dropping the manager stops its watcher

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::{ConfigSnapshot, SnapshotCache};
use crate::config::{Settings, WatchSettings};
use crate::health::{HealthReport, HealthState, SourceMode, WatchState};
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::metrics;
use crate::resolve::{EnvSource, FallbackResolver, ProcessEnv};
use crate::schema::{validate_schema, KeySchema, SchemaError, TypedValue};
use crate::store::{ClientCredentials, EtcdGatewayClient, KvClient, StoreConnection};
use crate::watch::Watcher;

enum Source {
    Store {
        client: Arc<dyn KvClient>,
        credentials: ClientCredentials,
    },
    Local,
}

enum Running {
    Local,
    Watcher {
        shutdown: Shutdown,
        handle: JoinHandle<()>,
    },
}

/// Live, typed view of a service's configuration.
pub struct ConfigManager {
    schema: Arc<dyn KeySchema>,
    resolver: Arc<FallbackResolver>,
    cache: Arc<SnapshotCache>,
    health: Arc<HealthState>,
    source: Source,
    settings: WatchSettings,
    running: Mutex<Option<Running>>,
    active: AtomicBool,
}

impl ConfigManager {
    pub fn builder(schema: Arc<dyn KeySchema>) -> ConfigManagerBuilder {
        ConfigManagerBuilder {
            schema,
            source: None,
            env: Arc::new(ProcessEnv),
            settings: WatchSettings::default(),
        }
    }

    /// Manager wired the way the daemon runs it: the etcd gateway client,
    /// or local-only mode when the settings ask for it.
    pub fn from_settings(
        schema: Arc<dyn KeySchema>,
        settings: &Settings,
    ) -> Result<Self, SchemaError> {
        let builder = Self::builder(schema).watch_settings(settings.watch.clone());
        let builder = if settings.store.local_only {
            builder.local_only()
        } else {
            builder.store(
                Arc::new(EtcdGatewayClient::new(settings.store.request_timeout())),
                ClientCredentials::from_settings(&settings.store),
            )
        };
        builder.build()
    }

    pub fn schema(&self) -> &Arc<dyn KeySchema> {
        &self.schema
    }

    pub fn mode(&self) -> SourceMode {
        match self.source {
            Source::Store { .. } => SourceMode::Store,
            Source::Local => SourceMode::LocalOnly,
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Begin serving. Idempotent: returns `true` at once when already running.
    ///
    /// In store mode, returns whether the first fetch completed within the
    /// initial fetch timeout. On `false` the watcher keeps retrying in the
    /// background and reads serve environment/default values meanwhile.
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return true;
        }

        match &self.source {
            Source::Local => {
                let revision = self.cache.next_revision();
                let (snapshot, warnings) = self.resolver.resolve_all(revision, None);
                for warning in warnings {
                    self.health.push_warning(warning);
                }
                self.cache.publish(snapshot);
                self.health.record_sync(SystemTime::now());
                metrics::record_snapshot_revision(revision);
                *running = Some(Running::Local);
                self.active.store(true, Ordering::Release);
                info!(prefix = self.schema.config_prefix(), "Serving local configuration only");
                true
            }
            Source::Store {
                client,
                credentials,
            } => {
                let mut watcher = Watcher::new(
                    StoreConnection::new(client.clone(), credentials.clone()),
                    self.schema.clone(),
                    self.resolver.clone(),
                    self.cache.clone(),
                    self.health.clone(),
                    self.settings.clone(),
                );
                let initial = watcher.initial_outcome();
                let shutdown = Shutdown::new();

                self.health.set_phase(WatchState::Connecting);
                let handle = tokio::spawn(watcher.run(shutdown.subscribe()));
                *running = Some(Running::Watcher { shutdown, handle });
                self.active.store(true, Ordering::Release);
                info!(
                    endpoint = %credentials.endpoint,
                    prefix = self.schema.config_prefix(),
                    "Config manager started"
                );
                // stop() must be able to take the watcher while we wait.
                drop(running);

                let timeout = self.settings.initial_fetch_timeout();
                match tokio::time::timeout(timeout, initial).await {
                    Ok(Ok(ok)) => ok,
                    Ok(Err(_)) => false,
                    Err(_) => {
                        warn!(
                            timeout_ms = timeout.as_millis() as u64,
                            "Initial fetch timed out, serving fallback values"
                        );
                        metrics::record_sync("timeout");
                        false
                    }
                }
            }
        }
    }

    /// Stop serving updates and release the store connection. Safe to call
    /// at any time, any number of times.
    pub async fn stop(&self) {
        let running = self.running.lock().await.take();
        self.active.store(false, Ordering::Release);
        match running {
            None => {}
            Some(Running::Local) => info!("Config manager stopped"),
            Some(Running::Watcher { shutdown, handle }) => {
                shutdown.trigger();
                if let Err(e) = handle.await {
                    warn!(error = %e, "Watcher task did not finish cleanly");
                }
                self.health.set_phase(WatchState::Stopped);
                info!("Config manager stopped");
            }
        }
    }

    /// The latest published snapshot. Never blocks; never fails.
    pub fn get_all_configs(&self) -> Arc<ConfigSnapshot> {
        self.cache.read()
    }

    /// Current value of one field.
    pub fn get(&self, field: &str) -> Option<TypedValue> {
        self.cache.read().get(field).cloned()
    }

    /// Observe the revision of every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.cache.subscribe()
    }

    pub fn health(&self) -> HealthReport {
        let snapshot = self.cache.read();
        HealthReport {
            state: self.health.state(),
            degraded: self.health.is_degraded(),
            mode: self.mode(),
            running: self.is_running(),
            last_successful_sync: self.health.last_successful_sync(),
            revision: snapshot.revision(),
            store_revision: snapshot.store_revision(),
            reconnect_attempts: self.health.reconnect_attempts(),
            warnings: self.health.warnings(),
        }
    }
}

/// Configures and validates a [`ConfigManager`].
pub struct ConfigManagerBuilder {
    schema: Arc<dyn KeySchema>,
    source: Option<Source>,
    env: Arc<dyn EnvSource>,
    settings: WatchSettings,
}

impl ConfigManagerBuilder {
    /// Read from a remote store.
    pub fn store(mut self, client: Arc<dyn KvClient>, credentials: ClientCredentials) -> Self {
        self.source = Some(Source::Store {
            client,
            credentials,
        });
        self
    }

    /// Serve environment variables and defaults only. The default when no
    /// store is configured.
    pub fn local_only(mut self) -> Self {
        self.source = Some(Source::Local);
        self
    }

    /// Replace the process environment as the fallback source.
    pub fn env(mut self, env: Arc<dyn EnvSource>) -> Self {
        self.env = env;
        self
    }

    pub fn watch_settings(mut self, settings: WatchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Result<ConfigManager, SchemaError> {
        validate_schema(self.schema.as_ref())?;

        let resolver = Arc::new(FallbackResolver::new(self.schema.clone(), self.env));
        let cache = Arc::new(SnapshotCache::new());
        let health = Arc::new(HealthState::new());

        let (placeholder, warnings) = resolver.resolve_all(0, None);
        cache.publish(placeholder);
        for warning in warnings {
            health.push_warning(warning);
        }

        Ok(ConfigManager {
            schema: self.schema,
            resolver,
            cache,
            health,
            source: self.source.unwrap_or(Source::Local),
            settings: self.settings,
            running: Mutex::new(None),
            active: AtomicBool::new(false),
        })
    }
}
