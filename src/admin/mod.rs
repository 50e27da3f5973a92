//! Read-only admin API over the config manager.
//!
//! # Routes
//! - `GET /admin/status`: version and mode
//! - `GET /admin/health`: watcher state, revisions, warnings
//! - `GET /admin/configs`: the current snapshot
//! - `GET /admin/configs/{field}`: one field, 404 if unmapped

pub mod auth;
pub mod handlers;
pub mod request_id;

use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use self::request_id::request_id_middleware;
use crate::manager::ConfigManager;

#[derive(Clone)]
pub struct AdminState {
    pub manager: Arc<ConfigManager>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(manager: Arc<ConfigManager>, api_key: &str) -> Self {
        Self {
            manager,
            api_key: Arc::from(api_key),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/health", get(get_health))
        .route("/admin/configs", get(get_configs))
        .route("/admin/configs/{field}", get(get_config))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
