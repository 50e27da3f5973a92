//! Metrics collection and exposition.
//!
//! # Metrics
//! - `config_sync_total` (counter): full fetches by `outcome` (ok, error, timeout)
//! - `config_watch_events_total` (counter): applied events by `kind`
//! - `config_reconnects_total` (counter): watcher session restarts
//! - `config_snapshot_revision` (gauge): last published snapshot revision
//! - `config_fallback_total` (counter): fields resolved away from the store, by `source`
//! - `config_degraded` (gauge): 1 while health reports degraded

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_sync(outcome: &'static str) {
    ::metrics::counter!("config_sync_total", "outcome" => outcome).increment(1);
}

pub fn record_watch_event(kind: &'static str) {
    ::metrics::counter!("config_watch_events_total", "kind" => kind).increment(1);
}

pub fn record_reconnect() {
    ::metrics::counter!("config_reconnects_total").increment(1);
}

pub fn record_snapshot_revision(revision: u64) {
    ::metrics::gauge!("config_snapshot_revision").set(revision as f64);
}

pub fn record_fallback(source: &'static str) {
    ::metrics::counter!("config_fallback_total", "source" => source).increment(1);
}

pub fn record_degraded(degraded: bool) {
    ::metrics::gauge!("config_degraded").set(if degraded { 1.0 } else { 0.0 });
}
