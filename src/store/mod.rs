//! Shared keyed store for alerting state
//!
//! ## Backends
//!
//! - **Memory** (default): process-local, for single-process deployments and tests
//! - **Redis** (`redis-store` feature): shared across processes

pub mod backend;
pub mod error;
pub mod memory;
#[cfg(feature = "redis-store")]
pub mod redis_store;

use std::sync::Arc;

pub use backend::{KeyedStore, StoreStats};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;

use crate::config::StoreConfig;

/// Build the store selected in the configuration.
pub async fn connect(config: &StoreConfig) -> StoreResult<Arc<dyn KeyedStore>> {
    match config {
        StoreConfig::Memory => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "redis-store")]
        StoreConfig::Redis { url } => Ok(Arc::new(redis_store::RedisStore::connect(url).await?)),
        #[cfg(not(feature = "redis-store"))]
        StoreConfig::Redis { .. } => Err(StoreError::Unavailable(
            "redis store requested but the redis-store feature is disabled".to_string(),
        )),
    }
}
