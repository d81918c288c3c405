//! Where snapshots and health reports go: the log, the console, or both

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use clap::ValueEnum;
use tracing::info;

use crate::{HealthReport, MetricsSnapshot, ProbeOutcome};

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("output writer lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputTarget {
    /// Structured log events
    #[default]
    Log,
    /// Human-readable tables on stdout
    Console,
    Both,
}

impl OutputTarget {
    pub fn sink(self) -> Arc<dyn ReportSink> {
        match self {
            OutputTarget::Log => Arc::new(LogSink),
            OutputTarget::Console => Arc::new(ConsoleSink::stdout()),
            OutputTarget::Both => Arc::new(Fanout(vec![
                Arc::new(LogSink),
                Arc::new(ConsoleSink::stdout()),
            ])),
        }
    }
}

pub trait ReportSink: Send + Sync {
    fn snapshot(&self, snapshot: &MetricsSnapshot) -> Result<(), OutputError>;

    fn health(&self, report: &HealthReport) -> Result<(), OutputError>;
}

/// Emits every record as one `info!` event with the JSON payload in a field
pub struct LogSink;

impl ReportSink for LogSink {
    fn snapshot(&self, snapshot: &MetricsSnapshot) -> Result<(), OutputError> {
        let payload = serde_json::to_string(snapshot)?;
        info!(target: "site_monitoring::metrics", snapshot = %payload, "metrics snapshot");
        Ok(())
    }

    fn health(&self, report: &HealthReport) -> Result<(), OutputError> {
        let payload = serde_json::to_string(report)?;
        info!(
            target: "site_monitoring::health",
            status = %report.overall_status,
            report = %payload,
            "health report"
        );
        Ok(())
    }
}

pub struct ConsoleSink<W> {
    writer: Mutex<W>,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> Result<W, OutputError> {
        self.writer.into_inner().map_err(|_| OutputError::Poisoned)
    }

    fn write(&self, text: &str) -> Result<(), OutputError> {
        let mut writer = self.writer.lock().map_err(|_| OutputError::Poisoned)?;
        writer.write_all(text.as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> ReportSink for ConsoleSink<W> {
    fn snapshot(&self, snapshot: &MetricsSnapshot) -> Result<(), OutputError> {
        self.write(&render_snapshot(snapshot))
    }

    fn health(&self, report: &HealthReport) -> Result<(), OutputError> {
        self.write(&render_health_table(report))
    }
}

/// Writes to every inner sink; the first failure is returned after all ran.
struct Fanout(Vec<Arc<dyn ReportSink>>);

impl ReportSink for Fanout {
    fn snapshot(&self, snapshot: &MetricsSnapshot) -> Result<(), OutputError> {
        self.0
            .iter()
            .map(|sink| sink.snapshot(snapshot))
            .fold(Ok(()), Result::and)
    }

    fn health(&self, report: &HealthReport) -> Result<(), OutputError> {
        self.0
            .iter()
            .map(|sink| sink.health(report))
            .fold(Ok(()), Result::and)
    }
}

fn outcome_line<T>(name: &str, outcome: &ProbeOutcome<T>, describe: impl Fn(&T) -> String) -> String {
    match outcome {
        ProbeOutcome::Ok(value) => format!("  {name:<10} {}\n", describe(value)),
        ProbeOutcome::Err { error } => format!("  {name:<10} ERROR: {error}\n"),
    }
}

pub fn render_snapshot(snapshot: &MetricsSnapshot) -> String {
    let mut out = format!("Metrics at {}\n", snapshot.timestamp.to_rfc3339());
    out.push_str(&outcome_line("memory", &snapshot.memory, |m| {
        let limit = m
            .limit_mb
            .map(|limit| format!(" / {limit:.0}MB"))
            .unwrap_or_default();
        format!("{:.1}MB (peak {:.1}MB){limit}", m.current_mb, m.peak_mb)
    }));
    out.push_str(&outcome_line("database", &snapshot.database, |d| {
        format!("{} in {:.2}ms", d.connection, d.query_time_ms)
    }));
    out.push_str(&outcome_line("cache", &snapshot.cache, |c| {
        format!("{} in {:.2}ms", c.driver, c.response_time_ms)
    }));
    out.push_str(&outcome_line("queue", &snapshot.queue, |q| match (q.pending, q.failed) {
        (Some(pending), failed) => format!(
            "{} ({}): {pending} pending, {} failed",
            q.driver,
            q.connection,
            failed.unwrap_or_default()
        ),
        (None, _) => format!("{} ({})", q.driver, q.connection),
    }));
    out.push_str(&outcome_line("disk", &snapshot.disk, |d| {
        format!("{:.1}% used, {:.0}MB free ({})", d.used_percent, d.free_mb, d.path)
    }));
    out
}

pub fn render_health_table(report: &HealthReport) -> String {
    let mut out = format!(
        "Health: {} ({}, {})\n",
        report.overall_status.as_str().to_uppercase(),
        report.environment,
        report.timestamp.to_rfc3339()
    );
    out.push_str(&format!(
        "{:<10} {:<10} {:>10}  {}\n",
        "COMPONENT", "STATUS", "TIME", "MESSAGE"
    ));
    for check in report.checks.values() {
        let time = check
            .response_time_ms
            .map(|ms| format!("{ms:.1}ms"))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<10} {:<10} {:>10}  {}\n",
            check.name, check.status, time, check.message
        ));
    }
    out
}
