//! etcd-dynconfig daemon.
//!
//! Serves the ControlUnit configuration from etcd (or the environment in
//! local mode), follows the served `log_level`, and exposes the admin API.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use etcd_dynconfig::admin::{setup_admin_router, AdminState};
use etcd_dynconfig::config::load_settings;
use etcd_dynconfig::lifecycle::shutdown::{Shutdown, ShutdownSignal};
use etcd_dynconfig::lifecycle::signals::wait_for_signal;
use etcd_dynconfig::observability::logging::{init_logging, LogHandle};
use etcd_dynconfig::observability::metrics;
use etcd_dynconfig::resolve::ProcessEnv;
use etcd_dynconfig::schema::{preset, KeySchema};
use etcd_dynconfig::ConfigManager;

#[derive(Parser)]
#[command(name = "etcd-dynconfig", version, about = "Live configuration from etcd")]
struct Args {
    /// Settings file (TOML). Environment variables override it.
    #[arg(short, long, env = "DYNCONFIG_SETTINGS")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let settings = load_settings(args.config.as_deref(), &ProcessEnv)?;

    let logs = init_logging(
        &settings.observability.log_level,
        settings.observability.json_logs,
    )?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "etcd-dynconfig starting");

    if settings.observability.metrics_enabled {
        match settings.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %settings.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let schema = Arc::new(preset::control_unit(
        settings.store.root_key.as_deref(),
        settings.store.dev,
    )?);
    tracing::info!(
        prefix = %schema.config_prefix(),
        local_only = settings.store.local_only,
        "Configuration loaded"
    );

    let manager = Arc::new(ConfigManager::from_settings(schema, &settings)?);
    if !manager.start().await {
        tracing::warn!("Initial fetch failed; serving fallback values while retrying");
    }

    let shutdown = Shutdown::new();
    let mut tasks = Vec::new();

    if settings.observability.follow_log_level {
        tasks.push(tokio::spawn(follow_log_level(
            manager.clone(),
            logs,
            shutdown.subscribe(),
        )));
    }

    if settings.admin.enabled {
        let listener = TcpListener::bind(&settings.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");
        let router = setup_admin_router(AdminState::new(manager.clone(), &settings.admin.api_key));
        let mut signal = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { signal.wait().await })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin API failed");
            }
        }));
    }

    wait_for_signal().await;
    shutdown.trigger();
    manager.stop().await;
    for task in tasks {
        let _ = task.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Apply the served `log_level` on every new snapshot.
async fn follow_log_level(manager: Arc<ConfigManager>, logs: LogHandle, mut shutdown: ShutdownSignal) {
    let mut revisions = manager.subscribe();
    loop {
        let snapshot = manager.get_all_configs();
        if let Some(level) = snapshot.get_str("log_level").filter(|l| !l.trim().is_empty()) {
            if let Err(e) = logs.apply_level(level) {
                tracing::warn!(error = %e, "Ignoring served log level");
            }
        }
        drop(snapshot);

        tokio::select! {
            _ = shutdown.wait() => break,
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}
