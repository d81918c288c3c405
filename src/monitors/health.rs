//! Component health checks
//!
//! Every component follows the same three-tier policy:
//!
//! - probe failed                         → unhealthy
//! - measured value above `unhealthy`     → unhealthy
//! - measured value above `warning`       → warning
//! - otherwise                            → healthy

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::{HealthConfig, HealthLimits, TierLimits};
use crate::probes::{ProbeError, Probes};
use crate::{ComponentCheck, HealthReport, HealthStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    Database,
    Cache,
    Disk,
    Queue,
    Memory,
}

impl Component {
    pub const ALL: [Component; 5] = [
        Component::Database,
        Component::Cache,
        Component::Disk,
        Component::Queue,
        Component::Memory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Database => "database",
            Component::Cache => "cache",
            Component::Disk => "disk",
            Component::Queue => "queue",
            Component::Memory => "memory",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Component {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Component::ALL
            .into_iter()
            .find(|component| component.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown component: {s}"))
    }
}

/// Place `value` in the tier its limits put it in.
pub fn classify(value: f64, limits: TierLimits) -> HealthStatus {
    if value > limits.unhealthy {
        HealthStatus::Unhealthy
    } else if value > limits.warning {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    }
}

fn failed(component: Component, error: &ProbeError) -> ComponentCheck {
    ComponentCheck::new(
        component,
        HealthStatus::Unhealthy,
        format!("{component} check failed: {error}"),
    )
    .with_detail("error", error.to_string())
}

#[derive(Clone)]
pub struct HealthChecker {
    probes: Probes,
    limits: HealthLimits,
    components: Vec<Component>,
    environment: String,
}

impl HealthChecker {
    /// Database and cache are always checked; `optional` adds to them.
    pub fn new(
        probes: Probes,
        limits: HealthLimits,
        optional: impl IntoIterator<Item = Component>,
        environment: impl ToString,
    ) -> Self {
        let mut components = vec![Component::Database, Component::Cache];
        for component in optional {
            if !components.contains(&component) {
                components.push(component);
            }
        }

        Self {
            probes,
            limits,
            components,
            environment: environment.to_string(),
        }
    }

    pub fn from_config(probes: Probes, config: &HealthConfig, environment: impl ToString) -> Self {
        let optional = config
            .optional_components
            .iter()
            .filter_map(|name| match name.parse::<Component>() {
                Ok(component) => Some(component),
                Err(e) => {
                    warn!("ignoring optional health component: {e}");
                    None
                }
            })
            .collect::<Vec<_>>();
        Self::new(probes, config.limits.clone(), optional, environment)
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Run the configured checks concurrently.
    #[instrument(skip(self))]
    pub async fn check(&self) -> HealthReport {
        let checks = join_all(
            self.components
                .iter()
                .map(|component| self.check_component(*component)),
        )
        .await;

        let report = HealthReport::aggregate(checks, &self.environment, Utc::now());
        debug!("health report is {}", report.overall_status);
        report
    }

    /// Run exactly one check, whether or not it is part of the configured set.
    #[instrument(skip(self))]
    pub async fn check_component(&self, component: Component) -> ComponentCheck {
        match component {
            Component::Database => self.check_database().await,
            Component::Cache => self.check_cache().await,
            Component::Disk => self.check_disk().await,
            Component::Queue => self.check_queue().await,
            Component::Memory => self.check_memory().await,
        }
    }

    async fn check_database(&self) -> ComponentCheck {
        let metrics = match self.probes.database().await {
            Ok(metrics) => metrics,
            Err(e) => return failed(Component::Database, &e),
        };

        let status = classify(metrics.query_time_ms, self.limits.database);
        let message = match status {
            HealthStatus::Healthy => "Database connection is healthy".to_string(),
            _ => format!("Database responding slowly ({:.1}ms)", metrics.query_time_ms),
        };

        let mut check = ComponentCheck::new(Component::Database, status, message)
            .with_response_time(metrics.query_time_ms)
            .with_detail("connection", metrics.connection);
        if let Some(active) = metrics.active_connections {
            check = check.with_detail("active_connections", active);
        }
        check
    }

    async fn check_cache(&self) -> ComponentCheck {
        let metrics = match self.probes.cache().await {
            Ok(metrics) => metrics,
            Err(e) => return failed(Component::Cache, &e),
        };

        let status = classify(metrics.response_time_ms, self.limits.cache);
        let message = match status {
            HealthStatus::Healthy => "Cache is working properly".to_string(),
            _ => format!("Cache responding slowly ({:.1}ms)", metrics.response_time_ms),
        };

        ComponentCheck::new(Component::Cache, status, message)
            .with_response_time(metrics.response_time_ms)
            .with_detail("driver", metrics.driver)
    }

    async fn check_disk(&self) -> ComponentCheck {
        let metrics = match self.probes.disk().await {
            Ok(metrics) => metrics,
            Err(e) => return failed(Component::Disk, &e),
        };

        let status = classify(metrics.used_percent, self.limits.disk);
        let message = match status {
            HealthStatus::Healthy => format!("Disk usage is normal ({:.1}%)", metrics.used_percent),
            HealthStatus::Warning => format!("Disk usage is high ({:.1}%)", metrics.used_percent),
            HealthStatus::Unhealthy => {
                format!("Disk space critically low ({:.1}% used)", metrics.used_percent)
            }
        };

        ComponentCheck::new(Component::Disk, status, message)
            .with_detail("used_percent", metrics.used_percent)
            .with_detail("free_mb", metrics.free_mb)
            .with_detail("total_mb", metrics.total_mb)
            .with_detail("path", metrics.path)
    }

    async fn check_memory(&self) -> ComponentCheck {
        let metrics = match self.probes.memory().await {
            Ok(metrics) => metrics,
            Err(e) => return failed(Component::Memory, &e),
        };

        let check = match metrics.limit_mb.filter(|limit| *limit > 0.0) {
            Some(limit) => {
                let percent = metrics.current_mb / limit * 100.0;
                let status = classify(percent, self.limits.memory);
                ComponentCheck::new(
                    Component::Memory,
                    status,
                    format!("Memory usage is {percent:.1}% of {limit:.0}MB"),
                )
                .with_detail("used_percent", percent)
                .with_detail("limit_mb", limit)
            }
            None => ComponentCheck::new(
                Component::Memory,
                HealthStatus::Healthy,
                format!("Memory usage is {:.1}MB, no limit known", metrics.current_mb),
            ),
        };

        check
            .with_detail("current_mb", metrics.current_mb)
            .with_detail("peak_mb", metrics.peak_mb)
    }

    async fn check_queue(&self) -> ComponentCheck {
        let metrics = match self.probes.queue().await {
            Ok(metrics) => metrics,
            Err(e) => return failed(Component::Queue, &e),
        };

        let Some(pending) = metrics.pending else {
            return ComponentCheck::new(
                Component::Queue,
                HealthStatus::Healthy,
                format!("Queue driver {} runs jobs inline", metrics.driver),
            )
            .with_detail("driver", metrics.driver);
        };

        let failed_jobs = metrics.failed.unwrap_or_default();
        let mut status = classify(pending as f64, self.limits.queue);
        if failed_jobs > 0 {
            status = status.max(HealthStatus::Warning);
        }

        let message = match status {
            HealthStatus::Healthy => format!("Queue is healthy ({pending} pending)"),
            _ if failed_jobs > 0 && pending as f64 <= self.limits.queue.warning => {
                format!("Queue has {failed_jobs} failed jobs")
            }
            _ => format!("Queue backlog of {pending} jobs ({failed_jobs} failed)"),
        };

        ComponentCheck::new(Component::Queue, status, message)
            .with_detail("driver", metrics.driver)
            .with_detail("connection", metrics.connection)
            .with_detail("pending", pending)
            .with_detail("failed", failed_jobs)
    }
}
