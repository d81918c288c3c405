//! Keyed store trait definition
//!
//! The store holds every piece of shared alerting state: dedup claims, error
//! counters and recent-error samples. It is shared by the request path and the
//! monitor loop, so the two write primitives must be atomic at the backend.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use super::error::StoreResult;

/// Backend-specific statistics, reported by the cache probe
pub type StoreStats = BTreeMap<String, serde_json::Value>;

/// Trait for shared keyed stores
///
/// ## Atomicity
///
/// - [`set_if_absent`](KeyedStore::set_if_absent) is the only dedup primitive.
///   Two concurrent callers with the same key must never both get `true`.
/// - [`increment`](KeyedStore::increment) returns the value after the
///   increment, so callers never read-modify-write.
///
/// ## Expiry
///
/// Every write carries a TTL. Entries past their TTL behave as absent. The TTL
/// of counters and lists is set when the key is created and not extended by
/// later writes.
#[async_trait]
pub trait KeyedStore: Send + Sync {
    /// Name of the backing driver (e.g. "memory", "redis")
    fn driver(&self) -> &str;

    /// Store `value` under `key` unless a live entry exists.
    ///
    /// Returns `true` if this call created the entry.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    /// Atomically increment the counter under `key` and return the new count.
    async fn increment(&self, key: &str, ttl: Duration) -> StoreResult<u64>;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Prepend `value` to the list under `key`, keeping at most `capacity`
    /// entries (newest first).
    async fn push_recent(
        &self,
        key: &str,
        value: &str,
        capacity: usize,
        ttl: Duration,
    ) -> StoreResult<()>;

    /// Entries of the list under `key`, newest first
    async fn recent(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Lightweight round trip
    async fn ping(&self) -> StoreResult<()>;

    async fn stats(&self) -> StoreResult<StoreStats>;

    /// Drop expired entries. Backends with native expiry return 0.
    async fn cleanup_expired(&self) -> StoreResult<usize>;
}
