//! Wiring of every component from one [`MonitoringConfig`]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::alerts::{AlertDeduplicator, AlertDispatcher, AlertPipeline, AlertWindow, channels};
use crate::config::{MonitoringConfig, QueueDriver};
use crate::monitors::{ContinuousMonitor, ErrorRateTracker, HealthChecker, MetricsCollector};
use crate::output::ReportSink;
use crate::probes::{
    DatabaseBackend, Probes, QueueBackend, SysinfoStats, SyncQueue, SystemStats,
    UnconfiguredDatabase,
};
use crate::store::{self, KeyedStore};

pub struct MonitoringContext {
    pub config: MonitoringConfig,
    pub store: Arc<dyn KeyedStore>,
    pub collector: MetricsCollector,
    pub checker: HealthChecker,
    pub pipeline: AlertPipeline,
    pub tracker: ErrorRateTracker,
}

impl MonitoringContext {
    /// Connect to the configured backends and build every component.
    pub async fn build(config: MonitoringConfig) -> Result<Self> {
        let store = store::connect(&config.store)
            .await
            .context("failed to connect to the alert store")?;
        let (database, queue) = backends(&config)?;
        let system = Arc::new(SysinfoStats::new(config.memory_limit_mb));
        let dispatcher = AlertDispatcher::new(channels::from_config(
            &channels::http_client()?,
            &config.alerts.channels,
        ));

        Self::from_parts(config, store, database, queue, system, dispatcher)
    }

    /// Build every component on top of already constructed backends.
    pub fn from_parts(
        config: MonitoringConfig,
        store: Arc<dyn KeyedStore>,
        database: Arc<dyn DatabaseBackend>,
        queue: Arc<dyn QueueBackend>,
        system: Arc<dyn SystemStats>,
        dispatcher: AlertDispatcher,
    ) -> Result<Self> {
        let probes = Probes::new(
            database,
            store.clone(),
            queue,
            system,
            config.disk_path.clone(),
            Duration::from_millis(config.health.probe_timeout_ms),
        );

        let window = AlertWindow::from_config(&config.alerts);
        let pipeline = AlertPipeline::new(AlertDeduplicator::new(store.clone(), window), dispatcher);
        if pipeline.dispatcher().is_empty() {
            warn!("no notification channels enabled, alerts will only be logged");
        } else {
            debug!(
                "notification channels: {}",
                pipeline.dispatcher().channel_names().join(", ")
            );
        }

        let tracker = ErrorRateTracker::from_config(store.clone(), &config.alerts, &config.thresholds)
            .context("invalid pattern in alerts.tracked_exceptions")?
            .with_pipeline(pipeline.clone());
        let checker = HealthChecker::from_config(probes.clone(), &config.health, &config.environment);

        Ok(Self {
            collector: MetricsCollector::new(probes),
            checker,
            pipeline,
            tracker,
            store,
            config,
        })
    }

    pub fn monitor(&self, sink: Arc<dyn ReportSink>) -> ContinuousMonitor {
        ContinuousMonitor::new(
            self.collector.clone(),
            self.checker.clone(),
            self.config.thresholds.clone(),
            self.pipeline.clone(),
            sink,
        )
    }

    /// The health secret is enforced in production only.
    #[cfg(feature = "api")]
    pub fn api_state(&self) -> crate::api::ApiState {
        let access = crate::api::ReportAccess::for_environment(
            self.config.is_production(),
            self.config.health.secret.clone(),
        );
        if access == crate::api::ReportAccess::Locked {
            warn!("no health check token configured in production, GET /health answers 401");
        }
        crate::api::ApiState::new(
            self.checker.clone(),
            self.tracker.clone(),
            access,
            Duration::from_secs(self.config.health.cache_ttl_seconds),
        )
    }
}

#[cfg(feature = "storage-sqlite")]
fn backends(config: &MonitoringConfig) -> Result<(Arc<dyn DatabaseBackend>, Arc<dyn QueueBackend>)> {
    use crate::probes::database::SqliteDatabase;
    use crate::probes::queue::DatabaseQueue;

    let database = config
        .database
        .as_ref()
        .map(SqliteDatabase::connect_lazy)
        .transpose()
        .context("failed to set up the database pool")?;

    let queue: Arc<dyn QueueBackend> = match (config.queue.driver, &database) {
        (QueueDriver::Sync, _) => Arc::new(SyncQueue::new(&config.queue.connection)),
        (QueueDriver::Database, Some(database)) => Arc::new(DatabaseQueue::new(
            database.pool().clone(),
            &config.queue.connection,
            &config.queue.queue,
        )),
        (QueueDriver::Database, None) => {
            anyhow::bail!("queue driver \"database\" needs a database connection")
        }
    };

    let database: Arc<dyn DatabaseBackend> = match database {
        Some(database) => Arc::new(database),
        None => Arc::new(UnconfiguredDatabase),
    };
    Ok((database, queue))
}

#[cfg(not(feature = "storage-sqlite"))]
fn backends(config: &MonitoringConfig) -> Result<(Arc<dyn DatabaseBackend>, Arc<dyn QueueBackend>)> {
    if config.database.is_some() {
        warn!("database configured but the storage-sqlite feature is disabled");
    }
    if config.queue.driver == QueueDriver::Database {
        anyhow::bail!("queue driver \"database\" needs the storage-sqlite feature");
    }
    Ok((
        Arc::new(UnconfiguredDatabase),
        Arc::new(SyncQueue::new(&config.queue.connection)),
    ))
}
