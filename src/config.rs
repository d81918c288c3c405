use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::trace;

use crate::alerts::Severity;
use crate::alerts::window::MAX_WINDOW;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default)]
    pub thresholds: ThresholdConfig,

    #[serde(default)]
    pub alerts: AlertsConfig,

    #[serde(default)]
    pub health: HealthConfig,

    /// Database backing the site; probed with a round-trip query.
    pub database: Option<DatabaseConfig>,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default = "default_disk_path")]
    pub disk_path: PathBuf,

    /// Memory limit of the process in MB. Falls back to total system memory.
    pub memory_limit_mb: Option<u64>,

    #[serde(default)]
    pub monitor: MonitorDefaults,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            thresholds: ThresholdConfig::default(),
            alerts: AlertsConfig::default(),
            health: HealthConfig::default(),
            database: None,
            store: StoreConfig::default(),
            queue: QueueConfig::default(),
            disk_path: default_disk_path(),
            memory_limit_mb: None,
            monitor: MonitorDefaults::default(),
        }
    }
}

impl MonitoringConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.alerts.time_window_minutes == 0 {
            return Err(ConfigError::Invalid(
                "alerts.time_window_minutes must be greater than 0".to_string(),
            ));
        }
        let max_minutes = MAX_WINDOW.as_secs() / 60;
        if self.alerts.time_window_minutes > max_minutes {
            return Err(ConfigError::Invalid(format!(
                "alerts.time_window_minutes must be at most {max_minutes}"
            )));
        }

        let t = &self.thresholds;
        let limits = [
            ("memory_usage_threshold", t.memory_usage_threshold),
            ("disk_usage_threshold", t.disk_usage_threshold),
            ("database_response_threshold", t.database_response_threshold),
            ("cache_response_threshold", t.cache_response_threshold),
            ("critical_margin_percent", t.critical_margin_percent),
        ];
        for (name, value) in limits {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "thresholds.{name} must be a non-negative number, got {value}"
                )));
            }
        }

        if self.health.probe_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "health.probe_timeout_ms must be greater than 0".to_string(),
            ));
        }

        for name in &self.health.optional_components {
            if !["disk", "queue", "memory"].contains(&name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "unknown optional health component: {name}"
                )));
            }
        }

        Ok(())
    }
}

/// Named numeric limits for the threshold evaluator.
///
/// Constructed once at startup and passed by reference.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Process memory in MB
    pub memory_usage_threshold: f64,
    /// Disk usage in percent
    pub disk_usage_threshold: f64,
    /// Database round trip in ms
    pub database_response_threshold: f64,
    /// Cache round trip in ms
    pub cache_response_threshold: f64,
    /// Errors of any kind per window
    pub error_rate_threshold: u64,
    /// Errors of one category per window
    pub error_type_threshold: u64,
    /// How far above a threshold (in percent of it) a value turns critical
    pub critical_margin_percent: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            memory_usage_threshold: 512.0,
            disk_usage_threshold: 90.0,
            database_response_threshold: 1000.0,
            cache_response_threshold: 100.0,
            error_rate_threshold: 50,
            error_type_threshold: 10,
            critical_margin_percent: 10.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "default_time_window_minutes")]
    pub time_window_minutes: u64,

    /// Extra lifetime of dedup keys and counters past their window
    #[serde(default = "default_grace_seconds")]
    pub grace_seconds: u64,

    #[serde(default)]
    pub channels: Vec<ChannelConfig>,

    /// Exception kinds counted towards the error rate. Entries are regular
    /// expressions matched against the whole kind; empty tracks everything.
    #[serde(default)]
    pub tracked_exceptions: Vec<String>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            time_window_minutes: default_time_window_minutes(),
            grace_seconds: default_grace_seconds(),
            channels: Vec::new(),
            tracked_exceptions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Alerts below this severity skip the channel
    pub min_severity: Option<Severity>,

    #[serde(flatten)]
    pub kind: ChannelKind,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelKind {
    Discord(Discord),
    Slack(Slack),
    Webhook(Webhook),
    Email(Email),
}

impl ChannelKind {
    pub fn name(&self) -> &'static str {
        match self {
            ChannelKind::Discord(_) => "discord",
            ChannelKind::Slack(_) => "slack",
            ChannelKind::Webhook(_) => "webhook",
            ChannelKind::Email(_) => "email",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Discord {
    pub url: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Slack {
    pub url: String,
    pub channel: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Webhook {
    pub url: String,
}

/// Email delivered through an HTTP mail relay
#[derive(Debug, Clone, Deserialize)]
pub struct Email {
    pub relay_url: String,
    pub from: String,
    pub to: Vec<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Shared secret required by `GET /health` in production
    pub secret: Option<String>,

    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Checks run besides database and cache: any of disk, queue, memory
    #[serde(default = "default_optional_components")]
    pub optional_components: Vec<String>,

    #[serde(default)]
    pub limits: HealthLimits,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            cache_ttl_seconds: default_cache_ttl_seconds(),
            probe_timeout_ms: default_probe_timeout_ms(),
            optional_components: default_optional_components(),
            limits: HealthLimits::default(),
        }
    }
}

/// Warning and unhealthy limits for one measured value.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TierLimits {
    pub warning: f64,
    pub unhealthy: f64,
}

/// Per-component limits for the three-tier health policy.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HealthLimits {
    /// Round trip in ms
    pub database: TierLimits,
    /// Round trip in ms
    pub cache: TierLimits,
    /// Used space in percent
    pub disk: TierLimits,
    /// Percent of the memory limit
    pub memory: TierLimits,
    /// Pending jobs
    pub queue: TierLimits,
}

impl Default for HealthLimits {
    fn default() -> Self {
        Self {
            database: TierLimits {
                warning: 100.0,
                unhealthy: 1000.0,
            },
            cache: TierLimits {
                warning: 50.0,
                unhealthy: 500.0,
            },
            disk: TierLimits {
                warning: 80.0,
                unhealthy: 95.0,
            },
            memory: TierLimits {
                warning: 80.0,
                unhealthy: 95.0,
            },
            queue: TierLimits {
                warning: 100.0,
                unhealthy: 1000.0,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_connection_name")]
    pub connection: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Storage of dedup keys and error counters
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Process-local, lost on restart
    #[default]
    Memory,

    Redis { url: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub driver: QueueDriver,

    #[serde(default = "default_connection_name")]
    pub connection: String,

    #[serde(default = "default_queue_name")]
    pub queue: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            driver: QueueDriver::default(),
            connection: default_connection_name(),
            queue: default_queue_name(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueDriver {
    /// Jobs run inline; nothing to count
    #[default]
    Sync,

    /// Jobs live in the `jobs` and `failed_jobs` tables of the site database
    Database,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorDefaults {
    /// Seconds between samples
    #[serde(default = "default_monitor_interval")]
    pub interval: u64,

    /// Total run length in seconds
    #[serde(default = "default_monitor_duration")]
    pub duration: u64,
}

impl Default for MonitorDefaults {
    fn default() -> Self {
        Self {
            interval: default_monitor_interval(),
            duration: default_monitor_duration(),
        }
    }
}

fn default_environment() -> String {
    String::from("local")
}

fn default_disk_path() -> PathBuf {
    PathBuf::from("/")
}

fn default_time_window_minutes() -> u64 {
    15
}

fn default_grace_seconds() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl_seconds() -> u64 {
    300
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_optional_components() -> Vec<String> {
    vec![String::from("disk"), String::from("queue")]
}

fn default_connection_name() -> String {
    String::from("default")
}

fn default_max_connections() -> u32 {
    5
}

fn default_queue_name() -> String {
    String::from("default")
}

fn default_monitor_interval() -> u64 {
    60
}

fn default_monitor_duration() -> u64 {
    3600
}

pub fn read_config_file(path: impl AsRef<Path>) -> Result<MonitoringConfig, ConfigError> {
    let path = path.as_ref();
    let file_content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: MonitoringConfig =
        serde_json::from_str(&file_content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    config.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}

/// Load the configuration file if it exists, defaults otherwise, then apply
/// environment overrides.
pub fn load_config(path: impl AsRef<Path>) -> Result<MonitoringConfig, ConfigError> {
    let path = path.as_ref();
    let mut config = if path.exists() {
        read_config_file(path)?
    } else {
        trace!("no config file at {}, using defaults", path.display());
        MonitoringConfig::default()
    };

    crate::util::apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
}
