pub mod collector;
pub mod continuous;
pub mod error_rate;
pub mod health;
pub mod thresholds;

pub use collector::MetricsCollector;
pub use continuous::{ContinuousMonitor, MonitorError, MonitorOptions, MonitorSummary, StopReason};
pub use error_rate::{ErrorRateTracker, ErrorSample};
pub use health::{Component, HealthChecker};
