//! Queue depth probe target

use async_trait::async_trait;

use super::error::ProbeError;

/// The site's job queue, seen only through its depth counters.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    fn driver(&self) -> &str;

    fn connection(&self) -> &str;

    /// Jobs waiting to run, if the driver can tell
    async fn pending(&self) -> Result<Option<u64>, ProbeError>;

    /// Jobs that failed permanently, if the driver can tell
    async fn failed(&self) -> Result<Option<u64>, ProbeError>;
}

/// Jobs run inline with the request; there is nothing to count.
#[derive(Debug, Clone)]
pub struct SyncQueue {
    connection: String,
}

impl SyncQueue {
    pub fn new(connection: impl ToString) -> Self {
        Self {
            connection: connection.to_string(),
        }
    }
}

#[async_trait]
impl QueueBackend for SyncQueue {
    fn driver(&self) -> &str {
        "sync"
    }

    fn connection(&self) -> &str {
        &self.connection
    }

    async fn pending(&self) -> Result<Option<u64>, ProbeError> {
        Ok(None)
    }

    async fn failed(&self) -> Result<Option<u64>, ProbeError> {
        Ok(None)
    }
}

#[cfg(feature = "storage-sqlite")]
pub use database::DatabaseQueue;

#[cfg(feature = "storage-sqlite")]
mod database {
    use async_trait::async_trait;
    use sqlx::SqlitePool;

    use super::QueueBackend;
    use crate::probes::error::ProbeError;

    /// Queue kept in the `jobs` and `failed_jobs` tables of the site database
    #[derive(Debug, Clone)]
    pub struct DatabaseQueue {
        pool: SqlitePool,
        connection: String,
        queue: String,
    }

    impl DatabaseQueue {
        pub fn new(pool: SqlitePool, connection: impl ToString, queue: impl ToString) -> Self {
            Self {
                pool,
                connection: connection.to_string(),
                queue: queue.to_string(),
            }
        }

        async fn count(&self, table: &str) -> Result<u64, ProbeError> {
            let sql = format!("SELECT COUNT(*) FROM {table} WHERE queue = ?");
            let count: i64 = sqlx::query_scalar(&sql)
                .bind(&self.queue)
                .fetch_one(&self.pool)
                .await?;
            Ok(u64::try_from(count).unwrap_or_default())
        }
    }

    #[async_trait]
    impl QueueBackend for DatabaseQueue {
        fn driver(&self) -> &str {
            "database"
        }

        fn connection(&self) -> &str {
            &self.connection
        }

        async fn pending(&self) -> Result<Option<u64>, ProbeError> {
            self.count("jobs").await.map(Some)
        }

        async fn failed(&self) -> Result<Option<u64>, ProbeError> {
            self.count("failed_jobs").await.map(Some)
        }
    }

}
