use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::health::{HealthReport, SourceMode};
use crate::resolve::ValueSource;
use crate::schema::TypedValue;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub mode: SourceMode,
    pub prefix: String,
    pub fields: usize,
}

#[derive(Serialize)]
pub struct FieldView {
    pub field: String,
    pub value: TypedValue,
    pub source: ValueSource,
    pub store_revision: u64,
    pub revision: u64,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let schema = state.manager.schema();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if state.manager.is_running() {
            "operational"
        } else {
            "stopped"
        },
        mode: state.manager.mode(),
        prefix: schema.config_prefix().to_string(),
        fields: schema.key_map().len(),
    })
}

pub async fn get_health(State(state): State<AdminState>) -> Json<HealthReport> {
    Json(state.manager.health())
}

pub async fn get_configs(
    State(state): State<AdminState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let snapshot = state.manager.get_all_configs();
    serde_json::to_value(&*snapshot)
        .map(Json)
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to serialise snapshot");
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

pub async fn get_config(
    State(state): State<AdminState>,
    Path(field): Path<String>,
) -> Result<Json<FieldView>, StatusCode> {
    let snapshot = state.manager.get_all_configs();
    let entry = snapshot.entry(&field).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(FieldView {
        value: entry.value.clone(),
        source: entry.source,
        store_revision: entry.store_revision,
        revision: snapshot.revision(),
        field,
    }))
}
