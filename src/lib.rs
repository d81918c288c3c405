pub mod alerts;
#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod context;
pub mod monitors;
pub mod output;
pub mod probes;
pub mod store;
pub mod util;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tri-state health of a single component or of a whole report.
///
/// Ordered by severity, so `max` over a set of statuses yields the worst one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Result of checking one component. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<f64>,
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl ComponentCheck {
    pub fn new(name: impl ToString, status: HealthStatus, message: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.to_string(),
            response_time_ms: None,
            details: BTreeMap::new(),
        }
    }

    pub fn with_response_time(mut self, response_time_ms: f64) -> Self {
        self.response_time_ms = Some(response_time_ms);
        self
    }

    pub fn with_detail(mut self, key: impl ToString, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub overall_status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub checks: BTreeMap<String, ComponentCheck>,
    pub environment: String,
}

impl HealthReport {
    /// Build a report whose overall status is the worst of its checks.
    ///
    /// A report without checks is healthy.
    pub fn aggregate(
        checks: impl IntoIterator<Item = ComponentCheck>,
        environment: impl ToString,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let checks: BTreeMap<String, ComponentCheck> = checks
            .into_iter()
            .map(|check| (check.name.clone(), check))
            .collect();

        let overall_status = checks
            .values()
            .map(|check| check.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);

        Self {
            overall_status,
            timestamp,
            checks,
            environment: environment.to_string(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.overall_status == HealthStatus::Healthy
    }
}

/// Outcome of a single probe inside a [`MetricsSnapshot`].
///
/// Serializes either as the payload itself or as `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProbeOutcome<T> {
    Ok(T),
    Err { error: String },
}

impl<T> ProbeOutcome<T> {
    pub fn ok(&self) -> Option<&T> {
        match self {
            ProbeOutcome::Ok(value) => Some(value),
            ProbeOutcome::Err { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ProbeOutcome::Ok(_) => None,
            ProbeOutcome::Err { error } => Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ProbeOutcome::Ok(_))
    }
}

impl<T, E: fmt::Display> From<Result<T, E>> for ProbeOutcome<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => ProbeOutcome::Ok(value),
            Err(e) => ProbeOutcome::Err {
                error: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetrics {
    pub current_mb: f64,
    pub peak_mb: f64,
    pub limit_mb: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseMetrics {
    pub connection: String,
    pub query_time_ms: f64,
    pub active_connections: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetrics {
    pub driver: String,
    pub response_time_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_stats: Option<BTreeMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMetrics {
    pub driver: String,
    pub connection: String,
    pub pending: Option<u64>,
    pub failed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskMetrics {
    pub used_percent: f64,
    pub free_mb: f64,
    pub total_mb: f64,
    pub path: String,
}

/// Flat record of every probe, for logging and export. No status judgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub memory: ProbeOutcome<MemoryMetrics>,
    pub database: ProbeOutcome<DatabaseMetrics>,
    pub cache: ProbeOutcome<CacheMetrics>,
    pub queue: ProbeOutcome<QueueMetrics>,
    pub disk: ProbeOutcome<DiskMetrics>,
}

impl MetricsSnapshot {
    /// Names of the probes that failed
    pub fn failed_probes(&self) -> Vec<&'static str> {
        [
            ("memory", self.memory.is_ok()),
            ("database", self.database.is_ok()),
            ("cache", self.cache.is_ok()),
            ("queue", self.queue.is_ok()),
            ("disk", self.disk.is_ok()),
        ]
        .into_iter()
        .filter_map(|(name, ok)| (!ok).then_some(name))
        .collect()
    }
}
