//! Error-rate tracking for every request
//!
//! The middleware only observes: responses pass through unchanged and a
//! panicking handler keeps panicking after it was counted.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use futures::FutureExt;
use tracing::error;

use crate::monitors::ErrorRateTracker;

/// Exception kind recorded for a panicking handler
pub const PANIC_KIND: &str = "panic";

/// Attach to a response to report an application exception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedError {
    pub kind: String,
    pub message: String,
}

impl TrackedError {
    pub fn new(kind: impl ToString, message: impl ToString) -> Self {
        Self {
            kind: kind.to_string(),
            message: message.to_string(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

pub async fn track_errors(
    State(tracker): State<ErrorRateTracker>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("handler for {method} {path} panicked: {message}");
            tracker
                .record_exception(PANIC_KIND, &format!("{method} {path}: {message}"))
                .await;
            std::panic::resume_unwind(payload);
        }
    };

    // a tracked exception stands for the failed response; count it once
    let counted = match response.extensions().get::<TrackedError>() {
        Some(tracked) => tracker
            .record_exception(&tracked.kind, &tracked.message)
            .await
            .is_some(),
        None => false,
    };
    if !counted {
        tracker
            .record_response(&method, &path, response.status().as_u16())
            .await;
    }

    response
}
