//! The watcher task.

use futures_util::StreamExt;
use std::collections::BTreeSet;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::cache::{FieldEntry, SnapshotCache};
use crate::config::WatchSettings;
use crate::health::{HealthState, WatchState};
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::observability::metrics;
use crate::resilience::Backoff;
use crate::resolve::{FallbackResolver, ResolveWarning, ValueSource};
use crate::schema::KeySchema;
use crate::store::{ChangeEvent, RangeResponse, StoreConnection, StoreError, WatchEvent};

/// Everything the watcher task needs. Built by the manager, consumed by `run`.
pub struct Watcher {
    connection: StoreConnection,
    schema: Arc<dyn KeySchema>,
    resolver: Arc<FallbackResolver>,
    cache: Arc<SnapshotCache>,
    health: Arc<HealthState>,
    settings: WatchSettings,
    backoff: Backoff,
    /// Outcome of the first session attempt, awaited by `start()`.
    initial: Option<oneshot::Sender<bool>>,
    connected_once: bool,
}

impl Watcher {
    pub fn new(
        connection: StoreConnection,
        schema: Arc<dyn KeySchema>,
        resolver: Arc<FallbackResolver>,
        cache: Arc<SnapshotCache>,
        health: Arc<HealthState>,
        settings: WatchSettings,
    ) -> Self {
        let backoff = Backoff::new(settings.backoff_base_ms, settings.backoff_max_ms);
        Self {
            connection,
            schema,
            resolver,
            cache,
            health,
            settings,
            backoff,
            initial: None,
            connected_once: false,
        }
    }

    /// Receive `true` once the first full fetch is published, `false` if the
    /// first attempt fails.
    pub fn initial_outcome(&mut self) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        self.initial = Some(tx);
        rx
    }

    /// Drive sessions until shutdown. Every suspension point is raced
    /// against `shutdown`; the connection is closed on every exit path.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        self.health.set_phase(WatchState::Connecting);

        loop {
            let ended = tokio::select! {
                _ = shutdown.wait() => break,
                ended = self.try_session() => ended,
            };
            let err = match ended {
                Ok(never) => match never {},
                Err(err) => err,
            };
            self.connection.close().await;
            self.report_initial(false);

            let delay = self.backoff.next_delay();
            let attempts = self.backoff.attempt();
            let degraded = attempts >= self.settings.degraded_after_attempts;
            self.health.set_reconnect_attempts(attempts);
            self.health.set_degraded(degraded);
            self.health.set_phase(if self.connected_once {
                WatchState::Reconnecting
            } else {
                WatchState::Connecting
            });
            metrics::record_reconnect();
            metrics::record_degraded(degraded);
            warn!(
                error = %err,
                kind = err.kind(),
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                degraded,
                "Watch session ended, backing off"
            );

            tokio::select! {
                _ = shutdown.wait() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.connection.close().await;
        self.health.set_phase(WatchState::Stopped);
        metrics::record_degraded(false);
        debug!("Watcher stopped");
    }

    /// One connect → fetch → watch cycle. Only returns on failure.
    async fn try_session(&mut self) -> Result<Infallible, StoreError> {
        self.connection.connect().await?;

        let keys: BTreeSet<String> = self.schema.key_map().keys().map(String::from).collect();
        let response = match self.connection.get_by_keys(&keys).await {
            Ok(response) => response,
            Err(err) => {
                metrics::record_sync("error");
                return Err(err);
            }
        };
        self.publish_full(&response);

        self.backoff.reset();
        self.health.set_reconnect_attempts(0);
        self.health.set_degraded(false);
        metrics::record_degraded(false);
        self.connected_once = true;
        self.report_initial(true);

        let prefix = watch_prefix(self.schema.config_prefix());
        let mut stream = self
            .connection
            .watch_prefix(&prefix, response.revision + 1)
            .await?;
        self.health.set_phase(WatchState::Watching);
        info!(prefix = %prefix, from_revision = response.revision + 1, "Watching for changes");

        let inactivity = self.settings.inactivity_timeout();
        loop {
            match tokio::time::timeout(inactivity, stream.next()).await {
                Err(_) => return Err(StoreError::WatchInactivity(inactivity)),
                Ok(None) => return Err(StoreError::StreamClosed),
                Ok(Some(Err(err))) => return Err(err),
                Ok(Some(Ok(WatchEvent::Progress { revision }))) => {
                    debug!(revision, "Watch progress");
                }
                Ok(Some(Ok(WatchEvent::Change(event)))) => self.apply_event(event),
            }
        }
    }

    /// Resolve every field from a full fetch and publish the result.
    fn publish_full(&self, response: &RangeResponse) {
        let revision = self.cache.next_revision();
        let (snapshot, warnings) = self.resolver.resolve_all(revision, Some(response));
        self.record_warnings(warnings);
        for (_, entry) in snapshot.entries() {
            if entry.source != ValueSource::Remote {
                metrics::record_fallback(entry.source.as_str());
            }
        }

        let store_revision = snapshot.store_revision();
        if self.cache.publish(snapshot) {
            self.health.record_sync(SystemTime::now());
            metrics::record_sync("ok");
            metrics::record_snapshot_revision(revision);
            info!(revision, store_revision, "Published full snapshot");
        }
    }

    /// Replace the one field `event` touches. Stale revisions are ignored.
    fn apply_event(&self, event: ChangeEvent) {
        let Some(field) = self.schema.key_map().field_for(&event.key) else {
            debug!(key = %event.key, "Ignoring change to unmapped key");
            return;
        };

        let current = self.cache.read();
        if let Some(seen) = current.field_revision(field) {
            if event.revision <= seen {
                debug!(field, revision = event.revision, seen, "Ignoring stale change");
                return;
            }
        }
        metrics::record_watch_event(event.kind.as_str());

        let resolved = self.resolver.resolve(field, event.value.as_deref());
        self.record_warnings(resolved.warnings);
        if resolved.source != ValueSource::Remote {
            metrics::record_fallback(resolved.source.as_str());
        }

        let revision = self.cache.next_revision();
        let entry = FieldEntry {
            value: resolved.value,
            source: resolved.source,
            store_revision: event.revision,
        };
        if self.cache.publish(current.with_field(revision, field, entry)) {
            metrics::record_snapshot_revision(revision);
            debug!(
                field,
                kind = event.kind.as_str(),
                store_revision = event.revision,
                revision,
                "Applied change"
            );
        }
    }

    fn record_warnings(&self, warnings: Vec<ResolveWarning>) {
        for warning in warnings {
            match &warning {
                ResolveWarning::CoercionFailed {
                    field,
                    source,
                    raw,
                    reason,
                } => warn!(field = %field, source = source.as_str(), raw = %raw, %reason, "Value did not coerce"),
                ResolveWarning::Unresolved { field } => {
                    warn!(field = %field, "No value anywhere, using zero value")
                }
            }
            self.health.push_warning(warning);
        }
    }

    fn report_initial(&mut self, ok: bool) {
        if let Some(tx) = self.initial.take() {
            let _ = tx.send(ok);
        }
    }
}

/// Watch everything below the config prefix, not siblings sharing its name.
fn watch_prefix(config_prefix: &str) -> String {
    format!("{}/", config_prefix.trim_end_matches('/'))
}
