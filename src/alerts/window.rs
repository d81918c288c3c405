use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::AlertsConfig;

/// Longest supported window, one week
pub const MAX_WINDOW: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Fixed, non-overlapping time buckets shared by alert dedup and error counters.
///
/// A bucket is identified by the unix second at which it starts. Keys written
/// for a bucket live for the window plus a grace period, so nothing outlives
/// the window it was written for by more than the grace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertWindow {
    window: Duration,
    grace: Duration,
}

impl AlertWindow {
    /// `window` is clamped to between one second and [`MAX_WINDOW`].
    pub fn new(window: Duration, grace: Duration) -> Self {
        Self {
            window: window.clamp(Duration::from_secs(1), MAX_WINDOW),
            grace,
        }
    }

    pub fn from_config(config: &AlertsConfig) -> Self {
        Self::new(
            Duration::from_secs(config.time_window_minutes.saturating_mul(60)),
            Duration::from_secs(config.grace_seconds),
        )
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Start of the bucket containing `timestamp`, in unix seconds
    pub fn bucket(&self, timestamp: DateTime<Utc>) -> i64 {
        let secs = self.window.as_secs() as i64;
        timestamp.timestamp().div_euclid(secs) * secs
    }

    /// Lifetime of keys written for one bucket
    pub fn ttl(&self) -> Duration {
        self.window.saturating_add(self.grace)
    }

    /// Dedup key for an alert type in the bucket of `timestamp`
    pub fn alert_key(&self, alert_type: &str, timestamp: DateTime<Utc>) -> String {
        format!("alert:{alert_type}:{}", self.bucket(timestamp))
    }

    /// Counter key for an error category in the bucket of `timestamp`
    pub fn error_key(&self, category: &str, timestamp: DateTime<Utc>) -> String {
        format!("errors:{category}:{}", self.bucket(timestamp))
    }

    /// Key of the recent error samples in the bucket of `timestamp`
    pub fn recent_key(&self, timestamp: DateTime<Utc>) -> String {
        format!("errors:recent:{}", self.bucket(timestamp))
    }
}
