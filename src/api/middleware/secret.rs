//! Shared-secret check for the full health report

use axum::{
    body::Body,
    extract::{Query, Request, State},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use tracing::debug;

use crate::api::{ApiError, ApiResult, ApiState, ReportAccess};

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    token: Option<String>,
}

/// Passes the request on when access is open or `?token=` matches the secret.
pub async fn require_health_token(
    State(state): State<ApiState>,
    Query(query): Query<TokenQuery>,
    request: Request<Body>,
    next: Next,
) -> ApiResult<Response> {
    match (&state.access, query.token) {
        (ReportAccess::Open, _) => {}
        (ReportAccess::Locked, _) => {
            debug!("rejected health report request, no secret is configured");
            return Err(ApiError::TokenNotConfigured);
        }
        (ReportAccess::Token(_), None) => return Err(ApiError::MissingToken),
        (ReportAccess::Token(expected), Some(token)) if token != *expected => {
            debug!("rejected health report request with a wrong token");
            return Err(ApiError::InvalidToken);
        }
        (ReportAccess::Token(_), Some(_)) => {}
    }

    Ok(next.run(request).await)
}
