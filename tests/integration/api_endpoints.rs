//! Integration tests for the HTTP health surface
//!
//! These tests verify that:
//! - Every endpoint returns the right status and body
//! - The full report honours the shared secret and its cache
//! - The error tracking middleware counts failures, panics and tracked errors

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use futures::FutureExt;
use serde_json::Value;
use site_monitoring::{
    api::{
        ApiConfig, ApiState, ReportAccess, TrackedError, middleware::track_errors, router,
        spawn_api_server,
    },
    monitors::ErrorRateTracker,
};
use tower::ServiceExt;

use crate::helpers::{FakeSystem, TestBed, TestBedBuilder, test_bed};

fn state(bed: &TestBed, secret: Option<&str>, cache_ttl: Duration) -> ApiState {
    ApiState::new(
        bed.context.checker.clone(),
        bed.context.tracker.clone(),
        secret.map_or(ReportAccess::Open, |s| ReportAccess::Token(s.to_string())),
        cache_ttl,
    )
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_ping_over_tcp() {
    let bed = test_bed();
    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
    };
    let addr = spawn_api_server(config, state(&bed, None, Duration::ZERO))
        .await
        .unwrap();

    let response = reqwest::get(format!("http://{addr}/health/ping")).await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_ping_touches_no_backend() {
    let bed = test_bed();
    bed.database.set_down(true);

    let (status, body) = get_json(router(state(&bed, None, Duration::ZERO)), "/health/ping").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_full_report() {
    let bed = test_bed();

    let (status, body) = get_json(router(state(&bed, None, Duration::ZERO)), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["overall_status"], "healthy");
    assert_eq!(body["environment"], "testing");
    assert_eq!(body["checks"]["database"]["status"], "healthy");
    assert_eq!(body["checks"]["cache"]["details"]["driver"], "memory");
}

#[tokio::test]
async fn test_warning_report_is_ok() {
    let bed = TestBedBuilder::new()
        .system(FakeSystem::with_disk(85.0))
        .build();

    let (status, body) = get_json(router(state(&bed, None, Duration::ZERO)), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["overall_status"], "warning");
}

#[tokio::test]
async fn test_unhealthy_report_is_503() {
    let bed = test_bed();
    bed.database.set_down(true);

    let (status, body) = get_json(router(state(&bed, None, Duration::ZERO)), "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["overall_status"], "unhealthy");
}

#[tokio::test]
async fn test_report_requires_secret_when_set() {
    let bed = test_bed();
    let app = router(state(&bed, Some("s3cret"), Duration::ZERO));

    let (status, body) = get_json(app.clone(), "/health").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Missing health check token");

    let (status, body) = get_json(app.clone(), "/health?token=wrong").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid health check token");

    let (status, _) = get_json(app.clone(), "/health?token=s3cret").await;
    assert_eq!(status, StatusCode::OK);

    // liveness and component checks stay open
    let (status, _) = get_json(app.clone(), "/health/ping").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get_json(app, "/health/database").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_secret_only_enforced_in_production() {
    let bed = TestBedBuilder::new()
        .config(|config| config.health.secret = Some("s3cret".to_string()))
        .build();
    let (status, _) = get_json(router(bed.context.api_state()), "/health").await;
    assert_eq!(status, StatusCode::OK);

    let bed = TestBedBuilder::new()
        .config(|config| {
            config.environment = "production".to_string();
            config.health.secret = Some("s3cret".to_string());
        })
        .build();
    let (status, _) = get_json(router(bed.context.api_state()), "/health").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_production_without_secret_is_locked() {
    let bed = TestBedBuilder::new()
        .config(|config| {
            config.environment = "production".to_string();
            config.health.secret = None;
        })
        .build();
    let app = router(bed.context.api_state());

    let (status, body) = get_json(app.clone(), "/health").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Health check token is not configured");

    let (status, _) = get_json(app.clone(), "/health?token=anything").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = get_json(app, "/health/ping").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_report_is_cached() {
    let bed = test_bed();
    let app = router(state(&bed, None, Duration::from_secs(300)));

    let (status, first) = get_json(app.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);

    bed.database.set_down(true);
    let (status, second) = get_json(app.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["timestamp"], second["timestamp"]);

    // single components are never cached
    let (status, _) = get_json(app, "/health/database").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_component_endpoints() {
    let bed = test_bed();
    let app = router(state(&bed, None, Duration::ZERO));

    let (status, body) = get_json(app.clone(), "/health/database").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "database");
    assert_eq!(body["details"]["connection"], "fake");

    let (status, body) = get_json(app.clone(), "/health/cache").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "cache");

    let (status, body) = get_json(app.clone(), "/health/disk").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["details"]["path"], "/srv/site");

    let (status, body) = get_json(app, "/health/gpu").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "unknown health component: gpu");
}

#[tokio::test]
async fn test_failed_component_is_503() {
    let bed = test_bed();
    bed.database.set_down(true);

    let (status, body) =
        get_json(router(state(&bed, None, Duration::ZERO)), "/health/database").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
}

async fn boom() -> &'static str {
    panic!("kaboom")
}

async fn failing_query() -> Response {
    let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
    response
        .extensions_mut()
        .insert(TrackedError::new("QueryException", "deadlock detected"));
    response
}

fn tracked_app(tracker: ErrorRateTracker) -> Router {
    Router::new()
        .route("/ok", get(|| async { "ok" }))
        .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
        .route("/boom", get(boom))
        .route("/query", get(failing_query))
        .layer(axum::middleware::from_fn_with_state(tracker, track_errors))
}

async fn request(app: Router, uri: &str) -> StatusCode {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn test_fifth_client_error_alerts_once() {
    let bed = TestBedBuilder::new()
        .config(|config| config.thresholds.error_type_threshold = 5)
        .build();
    let tracker = bed.context.tracker.clone();
    let app = tracked_app(tracker.clone());

    assert_eq!(request(app.clone(), "/ok").await, StatusCode::OK);
    for _ in 0..4 {
        assert_eq!(request(app.clone(), "/missing").await, StatusCode::NOT_FOUND);
    }
    assert!(bed.channel.sent().is_empty());

    assert_eq!(request(app.clone(), "/missing").await, StatusCode::NOT_FOUND);
    assert_eq!(
        bed.channel.sent_types(),
        vec!["high_error_type_rate:client_error"]
    );

    // the counter keeps going but never crosses the threshold again
    for _ in 0..5 {
        request(app.clone(), "/missing").await;
    }
    assert_eq!(bed.channel.sent().len(), 1);
    assert_eq!(tracker.count("client_error", Utc::now()).await, 10);
    assert_eq!(tracker.count("total", Utc::now()).await, 10);
}

#[tokio::test]
async fn test_panic_is_counted_and_resumed() {
    let bed = test_bed();
    let tracker = bed.context.tracker.clone();
    let app = tracked_app(tracker.clone());

    let result = AssertUnwindSafe(request(app, "/boom")).catch_unwind().await;
    assert!(result.is_err(), "the panic must reach the caller");

    assert_eq!(tracker.count("panic", Utc::now()).await, 1);
    let recent = tracker.recent_errors(Utc::now()).await;
    assert_eq!(recent[0].category, "panic");
    assert!(recent[0].message.contains("kaboom"), "{}", recent[0].message);
}

#[tokio::test]
async fn test_tracked_error_is_counted_once() {
    let bed = test_bed();
    let tracker = bed.context.tracker.clone();
    let app = tracked_app(tracker.clone());

    assert_eq!(
        request(app, "/query").await,
        StatusCode::INTERNAL_SERVER_ERROR
    );

    let now = Utc::now();
    assert_eq!(tracker.count("QueryException", now).await, 1);
    assert_eq!(tracker.count("server_error", now).await, 0);
    assert_eq!(tracker.count("total", now).await, 1);
}

#[tokio::test]
async fn test_untracked_error_falls_back_to_status() {
    let bed = TestBedBuilder::new()
        .config(|config| config.alerts.tracked_exceptions = vec!["Payment.*".to_string()])
        .build();
    let tracker = bed.context.tracker.clone();
    let app = tracked_app(tracker.clone());

    request(app, "/query").await;

    let now = Utc::now();
    assert_eq!(tracker.count("QueryException", now).await, 0);
    assert_eq!(tracker.count("server_error", now).await, 1);
}

#[tokio::test]
async fn test_health_router_tracks_its_own_errors() {
    let bed = test_bed();
    let tracker = bed.context.tracker.clone();

    let (status, _) = get_json(router(state(&bed, None, Duration::ZERO)), "/health/gpu").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(tracker.count("client_error", Utc::now()).await, 1);
}
