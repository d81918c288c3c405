//! API shared state

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::trace;

use crate::HealthReport;
use crate::monitors::{ErrorRateTracker, HealthChecker};

/// Last full health report and when it was taken
#[derive(Debug, Default)]
struct CachedReport {
    report: Option<(Instant, HealthReport)>,
}

/// Who may read the full health report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportAccess {
    Open,

    /// `?token=` must match
    Token(String),

    /// Production without a configured secret
    Locked,
}

impl ReportAccess {
    /// The secret is only enforced in production, where it is mandatory.
    pub fn for_environment(production: bool, secret: Option<String>) -> Self {
        match (production, secret) {
            (false, _) => ReportAccess::Open,
            (true, Some(secret)) => ReportAccess::Token(secret),
            (true, None) => ReportAccess::Locked,
        }
    }
}

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    pub checker: HealthChecker,

    /// Counts failed requests and handler panics
    pub tracker: ErrorRateTracker,

    /// Guards `GET /health`
    pub access: ReportAccess,

    cache_ttl: Duration,
    cache: Arc<RwLock<CachedReport>>,
}

impl ApiState {
    pub fn new(
        checker: HealthChecker,
        tracker: ErrorRateTracker,
        access: ReportAccess,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            checker,
            tracker,
            access,
            cache_ttl,
            cache: Arc::new(RwLock::new(CachedReport::default())),
        }
    }

    /// Full health report, reused for `cache_ttl` after it was taken.
    pub async fn health_report(&self) -> HealthReport {
        if let Some((taken, report)) = &self.cache.read().await.report
            && taken.elapsed() < self.cache_ttl
        {
            trace!("serving cached health report");
            return report.clone();
        }

        let mut cache = self.cache.write().await;
        // another request may have refreshed it while we waited for the lock
        if let Some((taken, report)) = &cache.report
            && taken.elapsed() < self.cache_ttl
        {
            return report.clone();
        }

        let report = self.checker.check().await;
        cache.report = Some((Instant::now(), report.clone()));
        report
    }
}
