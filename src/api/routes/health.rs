//! Health check endpoints

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Serialize;

use crate::api::{ApiError, ApiResult, ApiState};
use crate::monitors::Component;
use crate::{ComponentCheck, HealthReport, HealthStatus};

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub status: &'static str,
    pub timestamp: String,
}

fn status_code(status: HealthStatus) -> StatusCode {
    match status {
        HealthStatus::Healthy | HealthStatus::Warning => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// GET /health/ping
///
/// Liveness only; touches no backend.
pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        status: "ok",
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// GET /health
///
/// Full report of the configured checks; 503 when unhealthy.
pub async fn health_report(State(state): State<ApiState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.health_report().await;
    (status_code(report.overall_status), Json(report))
}

async fn single(state: &ApiState, component: Component) -> (StatusCode, Json<ComponentCheck>) {
    let check = state.checker.check_component(component).await;
    (status_code(check.status), Json(check))
}

/// GET /health/database
pub async fn database(State(state): State<ApiState>) -> (StatusCode, Json<ComponentCheck>) {
    single(&state, Component::Database).await
}

/// GET /health/cache
pub async fn cache(State(state): State<ApiState>) -> (StatusCode, Json<ComponentCheck>) {
    single(&state, Component::Cache).await
}

/// GET /health/:component
pub async fn component(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> ApiResult<(StatusCode, Json<ComponentCheck>)> {
    let component = name
        .parse::<Component>()
        .map_err(|_| ApiError::NotFound(format!("unknown health component: {name}")))?;
    Ok(single(&state, component).await)
}
