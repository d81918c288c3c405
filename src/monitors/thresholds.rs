//! Threshold evaluation
//!
//! Pure functions from measurements and a [`ThresholdConfig`] to alert
//! candidates. No I/O and no clock reads: every event carries the timestamp of
//! its input.
//!
//! A limit is crossed only when the measured value is strictly greater than
//! it, so a value sitting exactly at the threshold never fires.

use chrono::{DateTime, Utc};

use crate::alerts::{AlertEvent, Severity};
use crate::config::ThresholdConfig;
use crate::{HealthReport, HealthStatus, MetricsSnapshot};

/// Category of the overall error counter
pub const TOTAL_CATEGORY: &str = "total";

pub fn exceeds(value: f64, threshold: f64) -> bool {
    value > threshold
}

/// Warning, or critical when `value` exceeds `threshold` by more than
/// `margin_percent` percent of it.
pub fn severity_for(value: f64, threshold: f64, margin_percent: f64) -> Severity {
    let critical_above = threshold + threshold.abs() * margin_percent / 100.0;
    if value > critical_above {
        Severity::Critical
    } else {
        Severity::Warning
    }
}

fn measured(
    alert_type: &str,
    label: &str,
    value: f64,
    threshold: f64,
    unit: &str,
    config: &ThresholdConfig,
    timestamp: DateTime<Utc>,
) -> Option<AlertEvent> {
    if !exceeds(value, threshold) {
        return None;
    }

    let severity = severity_for(value, threshold, config.critical_margin_percent);
    let message = format!("{label} is {value:.1}{unit} (threshold: {threshold:.1}{unit})");
    Some(AlertEvent::new(alert_type, severity, message, timestamp).with_measurement(value, threshold, unit))
}

fn unavailable(probe: &str, error: &str, timestamp: DateTime<Utc>) -> AlertEvent {
    AlertEvent::new(
        format!("{probe}_unavailable"),
        Severity::Critical,
        format!("{probe} probe failed: {error}"),
        timestamp,
    )
    .with_context("error", error)
}

/// One candidate per violated threshold and one per failed probe.
pub fn evaluate_snapshot(snapshot: &MetricsSnapshot, config: &ThresholdConfig) -> Vec<AlertEvent> {
    let at = snapshot.timestamp;
    let mut events = Vec::new();

    match snapshot.memory.ok() {
        Some(memory) => events.extend(measured(
            "memory_usage",
            "Memory usage",
            memory.current_mb,
            config.memory_usage_threshold,
            "MB",
            config,
            at,
        )),
        None => events.push(unavailable("memory", snapshot.memory.error().unwrap_or_default(), at)),
    }

    match snapshot.disk.ok() {
        Some(disk) => events.extend(
            measured(
                "disk_usage",
                "Disk usage",
                disk.used_percent,
                config.disk_usage_threshold,
                "%",
                config,
                at,
            )
            .map(|event| event.with_context("path", disk.path.as_str())),
        ),
        None => events.push(unavailable("disk", snapshot.disk.error().unwrap_or_default(), at)),
    }

    match snapshot.database.ok() {
        Some(database) => events.extend(
            measured(
                "database_response",
                "Database response time",
                database.query_time_ms,
                config.database_response_threshold,
                "ms",
                config,
                at,
            )
            .map(|event| event.with_context("connection", database.connection.as_str())),
        ),
        None => events.push(unavailable(
            "database",
            snapshot.database.error().unwrap_or_default(),
            at,
        )),
    }

    match snapshot.cache.ok() {
        Some(cache) => events.extend(
            measured(
                "cache_response",
                "Cache response time",
                cache.response_time_ms,
                config.cache_response_threshold,
                "ms",
                config,
                at,
            )
            .map(|event| event.with_context("driver", cache.driver.as_str())),
        ),
        None => events.push(unavailable("cache", snapshot.cache.error().unwrap_or_default(), at)),
    }

    if let Some(error) = snapshot.queue.error() {
        events.push(unavailable("queue", error, at));
    }

    events
}

/// One candidate per component that is not healthy.
pub fn evaluate_health(report: &HealthReport) -> Vec<AlertEvent> {
    evaluate_health_except(report, &[])
}

/// Like [`evaluate_health`], without the components in `covered`, whose
/// failure is already reported as a `{probe}_unavailable` candidate.
pub fn evaluate_health_except(report: &HealthReport, covered: &[&str]) -> Vec<AlertEvent> {
    report
        .checks
        .values()
        .filter(|check| !covered.contains(&check.name.as_str()))
        .filter_map(|check| {
            let (alert_type, severity) = match check.status {
                HealthStatus::Healthy => return None,
                HealthStatus::Warning => (
                    format!("health_check_degraded:{}", check.name),
                    Severity::Warning,
                ),
                HealthStatus::Unhealthy => (
                    format!("health_check_failed:{}", check.name),
                    Severity::Critical,
                ),
            };

            let mut event = AlertEvent::new(
                alert_type,
                severity,
                format!("{} is {}: {}", check.name, check.status, check.message),
                report.timestamp,
            )
            .with_context("component", check.name.as_str())
            .with_context("status", check.status.as_str())
            .with_context("environment", report.environment.as_str());
            if let Some(response_time_ms) = check.response_time_ms {
                event = event.with_context("response_time_ms", response_time_ms);
            }
            Some(event)
        })
        .collect()
}

/// Alert type for an error counter category
pub fn error_rate_alert_type(category: &str) -> String {
    if category == TOTAL_CATEGORY {
        String::from("high_error_rate")
    } else {
        format!("high_error_type_rate:{category}")
    }
}

/// Candidate for a windowed error counter that was just incremented to `count`.
///
/// Counters only grow within a window, so the increment that makes `count`
/// equal to the threshold is the single crossing. A threshold of zero
/// disables the alert.
pub fn evaluate_error_rate(
    category: &str,
    count: u64,
    threshold: u64,
    timestamp: DateTime<Utc>,
) -> Option<AlertEvent> {
    if threshold == 0 || count != threshold {
        return None;
    }

    let (severity, message) = if category == TOTAL_CATEGORY {
        (
            Severity::Critical,
            format!("{count} errors in the current window (threshold: {threshold})"),
        )
    } else {
        (
            Severity::Warning,
            format!("{count} {category} errors in the current window (threshold: {threshold})"),
        )
    };

    Some(
        AlertEvent::new(error_rate_alert_type(category), severity, message, timestamp)
            .with_context("category", category)
            .with_measurement(count as f64, threshold as f64, "errors"),
    )
}

/// Candidates for the overall and the per-category counter after one error.
pub fn evaluate_error_counts(
    category: &str,
    total: u64,
    category_count: u64,
    config: &ThresholdConfig,
    timestamp: DateTime<Utc>,
) -> Vec<AlertEvent> {
    [
        evaluate_error_rate(TOTAL_CATEGORY, total, config.error_rate_threshold, timestamp),
        evaluate_error_rate(category, category_count, config.error_type_threshold, timestamp),
    ]
    .into_iter()
    .flatten()
    .collect()
}
