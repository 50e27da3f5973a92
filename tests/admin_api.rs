//! Admin API over a local-only manager.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use etcd_dynconfig::admin::request_id::REQUEST_ID_HEADER;
use etcd_dynconfig::admin::{setup_admin_router, AdminState};
use etcd_dynconfig::ConfigManager;

mod common;

const KEY: &str = "test-admin-key";

async fn router(start: bool) -> Router {
    let manager = ConfigManager::builder(common::schema())
        .local_only()
        .env(common::env(&[("WORKERS", "9"), ("NAME", "alpha")]))
        .build()
        .unwrap();
    if start {
        assert!(manager.start().await);
    }
    setup_admin_router(AdminState::new(Arc::new(manager), KEY))
}

fn get(path: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header("authorization", format!("Bearer {}", KEY))
        .body(Body::empty())
        .unwrap()
}

async fn json(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_rejects_missing_or_wrong_key() {
    let router = router(true).await;

    let anonymous = Request::builder()
        .uri("/admin/status")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(anonymous).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));

    let wrong = Request::builder()
        .uri("/admin/configs")
        .header("authorization", "Bearer nope")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(wrong).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_status_reports_mode() {
    let (status, body) = json(router(true).await, get("/admin/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "operational");
    assert_eq!(body["mode"], "local_only");
    assert_eq!(body["prefix"], common::PREFIX);
    assert_eq!(body["fields"], 4);

    let (_, body) = json(router(false).await, get("/admin/status")).await;
    assert_eq!(body["status"], "stopped");
}

#[tokio::test]
async fn test_health_report() {
    let (status, body) = json(router(true).await, get("/admin/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "stopped");
    assert_eq!(body["degraded"], false);
    assert_eq!(body["running"], true);
    assert_eq!(body["revision"], 1);
    assert!(body["last_successful_sync_ms"].as_u64().is_some());

    // "ratio" has no value anywhere.
    let warnings = body["warnings"].as_array().unwrap();
    assert!(warnings
        .iter()
        .any(|w| w["kind"] == "unresolved" && w["field"] == "ratio"));
}

#[tokio::test]
async fn test_configs_snapshot() {
    let (status, body) = json(router(true).await, get("/admin/configs")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revision"], 1);
    assert_eq!(body["values"]["workers"], 9);
    assert_eq!(body["values"]["name"], "alpha");
    assert_eq!(body["values"]["debug"], false);
    assert_eq!(body["sources"]["workers"], "env");
    assert_eq!(body["sources"]["debug"], "default");
    assert_eq!(body["sources"]["ratio"], "zero_value");
}

#[tokio::test]
async fn test_single_field() {
    let router = router(true).await;

    let (status, body) = json(router.clone(), get("/admin/configs/workers")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["field"], "workers");
    assert_eq!(body["value"], 9);
    assert_eq!(body["source"], "env");

    let (status, _) = json(router, get("/admin/configs/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let mut request = get("/admin/status");
    request
        .headers_mut()
        .insert(REQUEST_ID_HEADER, "req-123".parse().unwrap());
    let response = router(true).await.oneshot(request).await.unwrap();
    assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-123");

    let response = router(true).await.oneshot(get("/admin/status")).await.unwrap();
    let generated = response.headers()[REQUEST_ID_HEADER].to_str().unwrap();
    assert_eq!(generated.len(), 36);
}
