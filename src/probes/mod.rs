//! Probes: single measurements of one subsystem
//!
//! Every probe runs under its own timeout and returns a typed payload or a
//! [`ProbeError`]; nothing escapes past the probe boundary. Blocking OS reads
//! run on the blocking pool so a slow filesystem cannot stall the runtime.
//!
//! ```text
//! database → SELECT 1 round trip         → DatabaseMetrics
//! cache    → store ping + backend stats  → CacheMetrics
//! queue    → pending / failed job counts → QueueMetrics
//! disk     → usage of the configured path → DiskMetrics
//! memory   → resident memory of this process → MemoryMetrics
//! ```

pub mod database;
pub mod error;
pub mod queue;
pub mod system;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{instrument, trace, warn};

pub use database::{DatabaseBackend, UnconfiguredDatabase};
pub use error::ProbeError;
pub use queue::{QueueBackend, SyncQueue};
pub use system::{SysinfoStats, SystemStats};

use crate::store::KeyedStore;
use crate::{CacheMetrics, DatabaseMetrics, DiskMetrics, MemoryMetrics, QueueMetrics};

/// The set of probe targets, shared by the collector and the health checker.
#[derive(Clone)]
pub struct Probes {
    database: Arc<dyn DatabaseBackend>,
    store: Arc<dyn KeyedStore>,
    queue: Arc<dyn QueueBackend>,
    system: Arc<dyn SystemStats>,
    disk_path: PathBuf,
    timeout: Duration,
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

async fn with_timeout<T>(
    timeout: Duration,
    probe: impl Future<Output = Result<T, ProbeError>>,
) -> Result<T, ProbeError> {
    tokio::time::timeout(timeout, probe)
        .await
        .map_err(|_| ProbeError::Timeout(timeout))?
}

async fn blocking<T, F>(timeout: Duration, read: F) -> Result<T, ProbeError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ProbeError> + Send + 'static,
{
    with_timeout(timeout, async move {
        tokio::task::spawn_blocking(read)
            .await
            .map_err(|e| ProbeError::Failed(format!("probe task failed: {e}")))?
    })
    .await
}

impl Probes {
    pub fn new(
        database: Arc<dyn DatabaseBackend>,
        store: Arc<dyn KeyedStore>,
        queue: Arc<dyn QueueBackend>,
        system: Arc<dyn SystemStats>,
        disk_path: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            database,
            store,
            queue,
            system,
            disk_path: disk_path.into(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[instrument(skip(self))]
    pub async fn database(&self) -> Result<DatabaseMetrics, ProbeError> {
        let start = Instant::now();
        with_timeout(self.timeout, self.database.ping()).await?;
        let query_time_ms = elapsed_ms(start);
        trace!("database round trip took {query_time_ms:.2}ms");

        Ok(DatabaseMetrics {
            connection: self.database.connection_name().to_string(),
            query_time_ms,
            active_connections: self.database.active_connections(),
        })
    }

    #[instrument(skip(self))]
    pub async fn cache(&self) -> Result<CacheMetrics, ProbeError> {
        let start = Instant::now();
        with_timeout(self.timeout, async { Ok(self.store.ping().await?) }).await?;
        let response_time_ms = elapsed_ms(start);
        trace!("cache round trip took {response_time_ms:.2}ms");

        // stats are informational; a failure here does not fail the probe
        let backend_stats =
            match with_timeout(self.timeout, async { Ok(self.store.stats().await?) }).await {
                Ok(stats) => Some(stats),
                Err(e) => {
                    warn!("failed to read cache backend stats: {e}");
                    None
                }
            };

        Ok(CacheMetrics {
            driver: self.store.driver().to_string(),
            response_time_ms,
            backend_stats,
        })
    }

    #[instrument(skip(self))]
    pub async fn queue(&self) -> Result<QueueMetrics, ProbeError> {
        let (pending, failed) = with_timeout(self.timeout, async {
            let pending = self.queue.pending().await?;
            let failed = self.queue.failed().await?;
            Ok((pending, failed))
        })
        .await?;

        Ok(QueueMetrics {
            driver: self.queue.driver().to_string(),
            connection: self.queue.connection().to_string(),
            pending,
            failed,
        })
    }

    #[instrument(skip(self))]
    pub async fn disk(&self) -> Result<DiskMetrics, ProbeError> {
        let system = self.system.clone();
        let path = self.disk_path.clone();
        blocking(self.timeout, move || system.disk(&path)).await
    }

    #[instrument(skip(self))]
    pub async fn memory(&self) -> Result<MemoryMetrics, ProbeError> {
        let system = self.system.clone();
        blocking(self.timeout, move || system.memory()).await
    }
}
