//! Windowed error counters fed by request outcomes
//!
//! Every tracked error increments two counters in the shared store: the
//! overall `total` and the one of its category. The values returned by the
//! atomic increments are what the threshold check sees, so concurrent
//! requests can never both observe the crossing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::thresholds::{TOTAL_CATEGORY, evaluate_error_counts};
use crate::alerts::{AlertEvent, AlertPipeline, AlertWindow};
use crate::config::{AlertsConfig, ThresholdConfig};
use crate::store::KeyedStore;
use crate::util::truncate;

/// Samples kept per window
pub const RECENT_CAPACITY: usize = 100;

/// Longest sample message kept, in characters
pub const SAMPLE_MESSAGE_LENGTH: usize = 500;

/// One recent error, as kept in the sample list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSample {
    pub timestamp: DateTime<Utc>,
    pub category: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

/// Counts after recording one error
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub category: String,
    pub total: u64,
    pub category_count: u64,
    /// Alerts raised by this error, already handed to the pipeline
    pub candidates: Vec<AlertEvent>,
}

/// Category of an HTTP response, if it counts as an error
pub fn response_category(status: u16) -> Option<&'static str> {
    match status {
        400..=499 => Some("client_error"),
        500..=599 => Some("server_error"),
        _ => None,
    }
}

/// Counter category of an application exception: the bare kind, unless it
/// would share a counter with the overall or a response category.
pub fn exception_category(kind: &str) -> String {
    match kind {
        TOTAL_CATEGORY | "client_error" | "server_error" => format!("exception:{kind}"),
        _ => kind.to_string(),
    }
}

fn compile_allow_list(patterns: &[String]) -> Result<Vec<Regex>, regex::Error> {
    patterns
        .iter()
        .map(|pattern| Regex::new(&format!("^(?:{pattern})$")))
        .collect()
}

#[derive(Clone)]
pub struct ErrorRateTracker {
    store: Arc<dyn KeyedStore>,
    window: AlertWindow,
    thresholds: ThresholdConfig,
    tracked: Arc<Vec<Regex>>,
    pipeline: Option<AlertPipeline>,
}

impl ErrorRateTracker {
    /// `tracked_exceptions` are regular expressions matched against the whole
    /// exception kind; an empty list tracks every kind.
    pub fn new(
        store: Arc<dyn KeyedStore>,
        window: AlertWindow,
        thresholds: ThresholdConfig,
        tracked_exceptions: &[String],
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            store,
            window,
            thresholds,
            tracked: Arc::new(compile_allow_list(tracked_exceptions)?),
            pipeline: None,
        })
    }

    pub fn from_config(
        store: Arc<dyn KeyedStore>,
        alerts: &AlertsConfig,
        thresholds: &ThresholdConfig,
    ) -> Result<Self, regex::Error> {
        Self::new(
            store,
            AlertWindow::from_config(alerts),
            thresholds.clone(),
            &alerts.tracked_exceptions,
        )
    }

    /// Hand alert candidates to `pipeline`.
    pub fn with_pipeline(mut self, pipeline: AlertPipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn tracks(&self, kind: &str) -> bool {
        self.tracked.is_empty() || self.tracked.iter().any(|pattern| pattern.is_match(kind))
    }

    /// Record the outcome of one request. Statuses below 400 are ignored.
    pub async fn record_response(&self, method: &str, path: &str, status: u16) -> Option<ErrorRecord> {
        self.record_response_at(method, path, status, Utc::now()).await
    }

    #[instrument(skip(self))]
    pub async fn record_response_at(
        &self,
        method: &str,
        path: &str,
        status: u16,
        at: DateTime<Utc>,
    ) -> Option<ErrorRecord> {
        let category = response_category(status)?;
        let sample = ErrorSample {
            timestamp: at,
            category: category.to_string(),
            message: format!("{method} {path} returned {status}"),
            method: Some(method.to_string()),
            path: Some(truncate(path, SAMPLE_MESSAGE_LENGTH)),
            status: Some(status),
        };
        self.record(category, sample, at).await
    }

    /// Record an application exception of `kind`, if the allow-list tracks it.
    pub async fn record_exception(&self, kind: &str, message: &str) -> Option<ErrorRecord> {
        self.record_exception_at(kind, message, Utc::now()).await
    }

    #[instrument(skip(self, message))]
    pub async fn record_exception_at(
        &self,
        kind: &str,
        message: &str,
        at: DateTime<Utc>,
    ) -> Option<ErrorRecord> {
        if !self.tracks(kind) {
            debug!("exception kind {kind} is not tracked");
            return None;
        }

        let category = exception_category(kind);
        let sample = ErrorSample {
            timestamp: at,
            category: category.clone(),
            message: message.to_string(),
            method: None,
            path: None,
            status: None,
        };
        self.record(&category, sample, at).await
    }

    async fn record(&self, category: &str, mut sample: ErrorSample, at: DateTime<Utc>) -> Option<ErrorRecord> {
        let ttl = self.window.ttl();

        let total = match self
            .store
            .increment(&self.window.error_key(TOTAL_CATEGORY, at), ttl)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!("failed to count error: {e}");
                return None;
            }
        };
        let category_count = match self
            .store
            .increment(&self.window.error_key(category, at), ttl)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!("failed to count {category} error: {e}");
                return None;
            }
        };

        sample.message = truncate(&sample.message, SAMPLE_MESSAGE_LENGTH);
        match serde_json::to_string(&sample) {
            Ok(entry) => {
                if let Err(e) = self
                    .store
                    .push_recent(&self.window.recent_key(at), &entry, RECENT_CAPACITY, ttl)
                    .await
                {
                    warn!("failed to keep error sample: {e}");
                }
            }
            Err(e) => warn!("failed to encode error sample: {e}"),
        }

        let candidates = evaluate_error_counts(category, total, category_count, &self.thresholds, at);
        if let Some(pipeline) = &self.pipeline {
            pipeline.process_all(&candidates).await;
        }

        Some(ErrorRecord {
            category: category.to_string(),
            total,
            category_count,
            candidates,
        })
    }

    /// Error count of `category` in the window containing `at`
    pub async fn count(&self, category: &str, at: DateTime<Utc>) -> u64 {
        match self.store.get(&self.window.error_key(category, at)).await {
            Ok(value) => value.and_then(|v| v.parse().ok()).unwrap_or_default(),
            Err(e) => {
                warn!("failed to read {category} error count: {e}");
                0
            }
        }
    }

    /// Samples of the window containing `at`, newest first
    pub async fn recent_errors(&self, at: DateTime<Utc>) -> Vec<ErrorSample> {
        let entries = match self.store.recent(&self.window.recent_key(at)).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("failed to read recent errors: {e}");
                return Vec::new();
            }
        };

        entries
            .iter()
            .filter_map(|entry| match serde_json::from_str(entry) {
                Ok(sample) => Some(sample),
                Err(e) => {
                    warn!("skipping malformed error sample: {e}");
                    None
                }
            })
            .collect()
    }
}
