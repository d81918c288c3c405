//! Alert events and the path they take to a human
//!
//! ```text
//! AlertEvent → AlertDeduplicator::claim → AlertDispatcher::dispatch → [discord, slack, webhook, email]
//!                      ↑                                │
//!                      └──────── release ◄── every channel failed
//! ```

pub mod channels;
pub mod dedup;
pub mod dispatcher;
pub mod pipeline;
pub mod window;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use dedup::{AlertDeduplicator, DedupDecision};
pub use dispatcher::{AlertDispatcher, ChannelError, ChannelOutcome, DispatchReport, NotificationChannel};
pub use pipeline::{AlertPipeline, PipelineOutcome};
pub use window::AlertWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// A candidate notification. Its `alert_type` together with the window of its
/// `timestamp` identifies it for deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub alert_type: String,
    pub message: String,
    #[serde(default)]
    pub context: BTreeMap<String, Value>,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

impl AlertEvent {
    pub fn new(
        alert_type: impl ToString,
        severity: Severity,
        message: impl ToString,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            alert_type: alert_type.to_string(),
            message: message.to_string(),
            context: BTreeMap::new(),
            severity,
            timestamp,
        }
    }

    pub fn with_context(mut self, key: impl ToString, value: impl Into<Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    /// Attach the measured value and the limit it crossed.
    pub fn with_measurement(self, value: f64, threshold: f64, unit: &str) -> Self {
        self.with_context("value", value)
            .with_context("threshold", threshold)
            .with_context("unit", unit)
    }

    /// Human-readable title, e.g. `Disk Usage` for `disk_usage`
    pub fn title(&self) -> String {
        let base = self
            .alert_type
            .split_once(':')
            .map_or(self.alert_type.as_str(), |(base, _)| base);

        let mut title = base
            .split('_')
            .filter(|word| !word.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                chars
                    .next()
                    .map(|first| first.to_uppercase().chain(chars).collect::<String>())
                    .unwrap_or_default()
            })
            .collect::<Vec<_>>()
            .join(" ");

        if let Some((_, subject)) = self.alert_type.split_once(':') {
            title.push_str(&format!(" ({subject})"));
        }
        title
    }
}
