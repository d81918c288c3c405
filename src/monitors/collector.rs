use chrono::Utc;
use tracing::{debug, instrument};

use crate::MetricsSnapshot;
use crate::probes::Probes;

/// Runs every probe and records what it saw, judging nothing.
#[derive(Clone)]
pub struct MetricsCollector {
    probes: Probes,
}

impl MetricsCollector {
    pub fn new(probes: Probes) -> Self {
        Self { probes }
    }

    /// All probes run concurrently. A failing probe is recorded in its own
    /// field and never takes the rest of the snapshot with it.
    #[instrument(skip(self))]
    pub async fn collect(&self) -> MetricsSnapshot {
        let timestamp = Utc::now();
        let (memory, database, cache, queue, disk) = tokio::join!(
            self.probes.memory(),
            self.probes.database(),
            self.probes.cache(),
            self.probes.queue(),
            self.probes.disk(),
        );

        let snapshot = MetricsSnapshot {
            timestamp,
            memory: memory.into(),
            database: database.into(),
            cache: cache.into(),
            queue: queue.into(),
            disk: disk.into(),
        };
        debug!("collected metrics snapshot at {timestamp}");
        snapshot
    }
}
