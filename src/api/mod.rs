//! HTTP health surface
//!
//! ```text
//! GET /health/ping         liveness, no backend touched
//! GET /health              full report (cached, secret in production)
//! GET /health/database     one component
//! GET /health/cache
//! GET /health/:component   disk, queue or memory
//! ```
//!
//! Every route runs inside the error tracking middleware, so the health
//! surface counts its own failures like any other handler.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use middleware::TrackedError;
pub use state::{ApiState, ReportAccess};

use std::future::Future;
use std::net::SocketAddr;

use anyhow::Context;
use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: crate::util::get_default_bind(),
        }
    }
}

async fn bind(config: &ApiConfig) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!("health API listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// All health routes, wrapped in error tracking and request tracing.
pub fn router(state: ApiState) -> Router {
    let report = Router::new()
        .route("/health", get(routes::health::health_report))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_health_token,
        ));

    Router::new()
        .route("/health/ping", get(routes::health::ping))
        .route("/health/database", get(routes::health::database))
        .route("/health/cache", get(routes::health::cache))
        .route("/health/:component", get(routes::health::component))
        .merge(report)
        .layer(axum::middleware::from_fn_with_state(
            state.tracker.clone(),
            middleware::track_errors,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    config: ApiConfig,
    state: ApiState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = bind(&config).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("health API failed")
}

/// Serve from a background task and return the bound address.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    let listener = bind(&config).await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router(state)).await {
            error!("health API stopped: {e}");
        }
    });
    Ok(addr)
}
