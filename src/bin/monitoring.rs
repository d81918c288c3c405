use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use site_monitoring::{
    HealthStatus,
    alerts::{AlertEvent, Severity},
    config::load_config,
    context::MonitoringContext,
    monitors::{Component, MonitorOptions, StopReason, thresholds::evaluate_snapshot},
    output::{OutputTarget, render_health_table},
    util::get_bind,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(about = "Health checks and alerting for the site backend")]
struct Args {
    /// Config file (JSON); defaults apply when it does not exist
    #[arg(short, long, global = true, default_value = "monitoring.json")]
    config: PathBuf,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// One-shot metrics collection
    #[command(subcommand)]
    Metrics(MetricsCommand),

    /// Continuous monitoring
    #[command(subcommand)]
    Monitor(MonitorCommand),

    /// Health checks
    #[command(subcommand)]
    Health(HealthCommand),

    /// Alert delivery
    #[command(subcommand)]
    Alert(AlertCommand),

    /// Serve the HTTP health endpoints
    Serve {
        /// Address to bind; MONITORING_BIND or 127.0.0.1:8080 otherwise
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
}

#[derive(Debug, Clone, Subcommand)]
enum MetricsCommand {
    /// Collect one snapshot of every probe
    Collect {
        #[arg(long, value_enum, default_value_t = OutputTarget::Log)]
        output: OutputTarget,

        /// Purge expired alert and error-counter entries
        #[arg(long)]
        cleanup: bool,

        /// Evaluate thresholds and send alerts
        #[arg(long)]
        check_thresholds: bool,
    },
}

#[derive(Debug, Clone, Subcommand)]
enum MonitorCommand {
    /// Sample the system at a fixed interval
    System {
        /// Seconds between samples
        #[arg(long)]
        interval: Option<u64>,

        /// Total run length in seconds
        #[arg(long)]
        duration: Option<u64>,

        #[arg(long, value_enum, default_value_t = OutputTarget::Log)]
        output: OutputTarget,

        /// Run the health checks in every iteration
        #[arg(long)]
        health_checks: bool,

        /// Evaluate thresholds and send alerts
        #[arg(long)]
        alert_on_issues: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Table,
    Json,
}

#[derive(Debug, Clone, Subcommand)]
enum HealthCommand {
    /// Run the health checks once
    Check {
        /// Check only this component
        #[arg(long)]
        component: Option<Component>,

        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,

        /// Exit with 1 on warnings too
        #[arg(long)]
        fail_on_warning: bool,
    },
}

#[derive(Debug, Clone, Subcommand)]
enum AlertCommand {
    /// Send a test alert, bypassing evaluation and deduplication
    Test {
        /// info, warning or critical
        level: Severity,

        #[arg(long, default_value = "This is a test alert from the monitoring system")]
        message: String,

        /// Send to this channel only
        #[arg(long)]
        channel: Option<String>,
    },
}

fn init(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = filter::Targets::new()
        .with_targets(vec![("site_monitoring", level), ("monitoring", level)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

/// Token cancelled on Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl-C, stopping");
                cancel.cancel();
            }
            Err(e) => error!("failed to listen for Ctrl-C: {e}"),
        }
    });
    token
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let config = load_config(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    let context = MonitoringContext::build(config).await?;

    match args.command {
        Command::Metrics(MetricsCommand::Collect {
            output,
            cleanup,
            check_thresholds,
        }) => collect(&context, output, cleanup, check_thresholds).await,
        Command::Monitor(MonitorCommand::System {
            interval,
            duration,
            output,
            health_checks,
            alert_on_issues,
        }) => {
            let options = MonitorOptions {
                interval: Duration::from_secs(interval.unwrap_or(context.config.monitor.interval)),
                duration: Duration::from_secs(duration.unwrap_or(context.config.monitor.duration)),
                include_health_checks: health_checks,
                alert_on_issues,
                alert_on_failure: true,
            };
            monitor(&context, options, output).await
        }
        Command::Health(HealthCommand::Check {
            component,
            format,
            fail_on_warning,
        }) => health(&context, component, format, fail_on_warning).await,
        Command::Alert(AlertCommand::Test {
            level,
            message,
            channel,
        }) => test_alert(&context, level, message, channel).await,
        Command::Serve { bind } => serve(&context, bind.unwrap_or_else(get_bind)).await,
    }
}

async fn collect(
    context: &MonitoringContext,
    output: OutputTarget,
    cleanup: bool,
    check_thresholds: bool,
) -> anyhow::Result<ExitCode> {
    let snapshot = context.collector.collect().await;
    output.sink().snapshot(&snapshot)?;

    if check_thresholds {
        let events = evaluate_snapshot(&snapshot, &context.config.thresholds);
        if events.is_empty() {
            info!("all metrics within thresholds");
        }
        for outcome in context.pipeline.process_all(&events).await {
            debug!("alert outcome: {outcome:?}");
        }
    }

    if cleanup {
        let removed = context
            .store
            .cleanup_expired()
            .await
            .context("failed to clean up expired entries")?;
        info!("removed {removed} expired entries");
    }

    Ok(ExitCode::SUCCESS)
}

async fn monitor(
    context: &MonitoringContext,
    options: MonitorOptions,
    output: OutputTarget,
) -> anyhow::Result<ExitCode> {
    let monitor = context.monitor(output.sink());
    let summary = monitor.run(&options, cancel_on_ctrl_c()).await?;

    match summary.stop_reason {
        StopReason::DurationElapsed => info!("monitoring finished"),
        StopReason::Cancelled => info!("monitoring cancelled"),
    }
    if summary.failed_iterations > 0 {
        warn!(
            "{} of {} iterations failed",
            summary.failed_iterations, summary.iterations
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn health(
    context: &MonitoringContext,
    component: Option<Component>,
    format: Format,
    fail_on_warning: bool,
) -> anyhow::Result<ExitCode> {
    let (status, rendered) = match component {
        Some(component) => {
            let check = context.checker.check_component(component).await;
            let rendered = match format {
                Format::Json => serde_json::to_string_pretty(&check)?,
                Format::Table => format!("{}: {} - {}", check.name, check.status, check.message),
            };
            (check.status, rendered)
        }
        None => {
            let report = context.checker.check().await;
            let rendered = match format {
                Format::Json => serde_json::to_string_pretty(&report)?,
                Format::Table => render_health_table(&report),
            };
            (report.overall_status, rendered)
        }
    };
    println!("{}", rendered.trim_end());

    let failed = match status {
        HealthStatus::Healthy => false,
        HealthStatus::Warning => fail_on_warning,
        HealthStatus::Unhealthy => true,
    };
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn test_alert(
    context: &MonitoringContext,
    level: Severity,
    message: String,
    channel: Option<String>,
) -> anyhow::Result<ExitCode> {
    let dispatcher = context.pipeline.dispatcher();
    if let Some(channel) = &channel
        && !dispatcher.has_channel(channel)
    {
        anyhow::bail!(
            "channel {channel} is not enabled (enabled: {})",
            dispatcher.channel_names().join(", ")
        );
    }

    let event = AlertEvent::new("test_alert", level, message, Utc::now())
        .with_context("source", "cli")
        .with_context("environment", context.config.environment.as_str());
    let report = match &channel {
        Some(channel) => dispatcher.dispatch_to(&event, channel).await,
        None => dispatcher.dispatch(&event).await,
    };

    if report.is_empty() {
        warn!("no channel accepted the test alert");
        return Ok(ExitCode::FAILURE);
    }
    for result in &report.results {
        println!("{}: {:?}", result.channel, result.outcome);
    }

    Ok(if report.all_failed() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

#[cfg(feature = "api")]
async fn serve(context: &MonitoringContext, bind: SocketAddr) -> anyhow::Result<ExitCode> {
    use site_monitoring::api::{ApiConfig, serve};

    let cancel = cancel_on_ctrl_c();
    serve(
        ApiConfig { bind_addr: bind },
        context.api_state(),
        cancel.cancelled_owned(),
    )
    .await?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(not(feature = "api"))]
async fn serve(_context: &MonitoringContext, _bind: SocketAddr) -> anyhow::Result<ExitCode> {
    anyhow::bail!("the HTTP server needs the api feature")
}
