//! Database round-trip probe target

use async_trait::async_trait;

use super::error::ProbeError;

/// The site database, seen only through what the probe needs.
#[async_trait]
pub trait DatabaseBackend: Send + Sync {
    /// Name of the configured connection, reported in snapshots
    fn connection_name(&self) -> &str;

    /// One lightweight round trip (e.g. `SELECT 1`)
    async fn ping(&self) -> Result<(), ProbeError>;

    /// Connections currently checked out, if the backend knows
    fn active_connections(&self) -> Option<u64>;
}

/// Stand-in when no database is configured; every probe reports it.
#[derive(Debug, Default)]
pub struct UnconfiguredDatabase;

#[async_trait]
impl DatabaseBackend for UnconfiguredDatabase {
    fn connection_name(&self) -> &str {
        "none"
    }

    async fn ping(&self) -> Result<(), ProbeError> {
        Err(ProbeError::Unavailable(
            "no database connection configured".to_string(),
        ))
    }

    fn active_connections(&self) -> Option<u64> {
        None
    }
}

#[cfg(feature = "storage-sqlite")]
pub use sqlite::SqliteDatabase;

#[cfg(feature = "storage-sqlite")]
mod sqlite {
    use async_trait::async_trait;
    use sqlx::SqlitePool;
    use sqlx::sqlite::SqlitePoolOptions;
    use tracing::debug;

    use super::DatabaseBackend;
    use crate::config::DatabaseConfig;
    use crate::probes::error::ProbeError;

    /// SQLite connection pool of the site
    #[derive(Debug, Clone)]
    pub struct SqliteDatabase {
        pool: SqlitePool,
        connection: String,
    }

    impl SqliteDatabase {
        /// Create the pool without connecting; a database that is down at
        /// startup shows up in the first probe instead of failing the process.
        pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self, ProbeError> {
            let pool = SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .connect_lazy(&config.url)?;
            debug!("created lazy sqlite pool for connection {}", config.connection);
            Ok(Self {
                pool,
                connection: config.connection.clone(),
            })
        }

        pub fn from_pool(pool: SqlitePool, connection: impl ToString) -> Self {
            Self {
                pool,
                connection: connection.to_string(),
            }
        }

        pub fn pool(&self) -> &SqlitePool {
            &self.pool
        }
    }

    #[async_trait]
    impl DatabaseBackend for SqliteDatabase {
        fn connection_name(&self) -> &str {
            &self.connection
        }

        async fn ping(&self) -> Result<(), ProbeError> {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        }

        fn active_connections(&self) -> Option<u64> {
            let size = u64::from(self.pool.size());
            let idle = self.pool.num_idle() as u64;
            Some(size.saturating_sub(idle))
        }
    }

}
