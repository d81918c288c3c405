//! The long-running monitor loop
//!
//! ```text
//! tick → collect snapshot → [health check] → sink → [evaluate → pipeline] → wait for tick
//!   ↑                                                                        │
//!   └──────── until the duration elapsed or the token is cancelled ◄─────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::collector::MetricsCollector;
use super::health::HealthChecker;
use super::thresholds::{evaluate_health_except, evaluate_snapshot};
use crate::alerts::{AlertEvent, AlertPipeline, Severity};
use crate::config::ThresholdConfig;
use crate::output::{OutputError, ReportSink};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorOptions {
    pub interval: Duration,
    pub duration: Duration,
    pub include_health_checks: bool,
    pub alert_on_issues: bool,
    /// Raise a critical `monitoring_error` alert when an iteration fails
    pub alert_on_failure: bool,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            duration: Duration::from_secs(3600),
            include_health_checks: false,
            alert_on_issues: false,
            alert_on_failure: true,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MonitorError {
    #[error("monitor interval must be greater than zero")]
    ZeroInterval,

    #[error("monitor duration must be greater than zero")]
    ZeroDuration,
}

impl MonitorOptions {
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.interval.is_zero() {
            return Err(MonitorError::ZeroInterval);
        }
        if self.duration.is_zero() {
            return Err(MonitorError::ZeroDuration);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    DurationElapsed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorSummary {
    pub iterations: u64,
    pub failed_iterations: u64,
    pub stop_reason: StopReason,
}

pub struct ContinuousMonitor {
    collector: MetricsCollector,
    checker: HealthChecker,
    thresholds: ThresholdConfig,
    pipeline: AlertPipeline,
    sink: Arc<dyn ReportSink>,
}

impl ContinuousMonitor {
    pub fn new(
        collector: MetricsCollector,
        checker: HealthChecker,
        thresholds: ThresholdConfig,
        pipeline: AlertPipeline,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        Self {
            collector,
            checker,
            thresholds,
            pipeline,
            sink,
        }
    }

    /// Run until `options.duration` has elapsed or `cancel` fires.
    ///
    /// The first iteration starts immediately. The wait between iterations
    /// is shortened by the time the iteration took; iterations that overran
    /// the interval push the schedule back instead of bursting.
    #[instrument(skip(self, cancel), fields(interval = ?options.interval, duration = ?options.duration))]
    pub async fn run(
        &self,
        options: &MonitorOptions,
        cancel: CancellationToken,
    ) -> Result<MonitorSummary, MonitorError> {
        options.validate()?;

        let deadline = Instant::now() + options.duration;
        let mut ticker = interval(options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut iterations = 0;
        let mut failed_iterations = 0;

        info!("starting continuous monitoring");
        let stop_reason = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break StopReason::Cancelled,
                _ = sleep_until(deadline) => break StopReason::DurationElapsed,
                _ = ticker.tick() => {}
            }

            iterations += 1;
            if let Err(e) = self.iteration(options).await {
                failed_iterations += 1;
                error!("monitoring iteration {iterations} failed: {e}");
                if options.alert_on_failure {
                    let event = AlertEvent::new(
                        "monitoring_error",
                        Severity::Critical,
                        format!("Monitoring iteration failed: {e}"),
                        Utc::now(),
                    )
                    .with_context("iteration", iterations);
                    self.pipeline.process(&event).await;
                }
            }
        };

        let summary = MonitorSummary {
            iterations,
            failed_iterations,
            stop_reason,
        };
        info!(
            "monitoring stopped ({stop_reason:?}) after {} iterations, {} failed",
            summary.iterations, summary.failed_iterations
        );
        Ok(summary)
    }

    async fn iteration(&self, options: &MonitorOptions) -> Result<(), OutputError> {
        let snapshot = self.collector.collect().await;
        let health = if options.include_health_checks {
            Some(self.checker.check().await)
        } else {
            None
        };

        // alerts go out even when the sink is broken
        let emitted = self.sink.snapshot(&snapshot).and_then(|()| match &health {
            Some(report) => self.sink.health(report),
            None => Ok(()),
        });

        if options.alert_on_issues {
            let mut events = evaluate_snapshot(&snapshot, &self.thresholds);
            if let Some(report) = &health {
                events.extend(evaluate_health_except(report, &snapshot.failed_probes()));
            }
            if events.is_empty() {
                debug!("no issues found");
            } else {
                warn!("found {} issues", events.len());
                self.pipeline.process_all(&events).await;
            }
        }

        emitted
    }
}
