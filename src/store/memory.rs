//! In-memory keyed store (no persistence)
//!
//! Every operation takes the same mutex, which makes `set_if_absent` and
//! `increment` atomic for all tasks of this process. State is lost on restart,
//! which only means an alert may be sent once more. Writes also drop expired
//! entries, at most once per [`SWEEP_INTERVAL`].

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::backend::{KeyedStore, StoreStats};
use super::error::{StoreError, StoreResult};

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Counter(u64),
    List(VecDeque<String>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Text(_) => "text",
            Value::Counter(_) => "counter",
            Value::List(_) => "list",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// How often a write sweeps expired entries out of the map
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    next_sweep: Option<Instant>,
}

impl Inner {
    fn remove_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before - self.entries.len()
    }

    fn sweep_if_due(&mut self, now: Instant) {
        if self.next_sweep.is_some_and(|at| now < at) {
            return;
        }
        self.next_sweep = Some(now + SWEEP_INTERVAL);
        let removed = self.remove_expired(now);
        if removed > 0 {
            debug!("swept {removed} expired entries from memory store");
        }
    }
}

/// In-memory keyed store
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .lock()
            .await
            .entries
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of stored entries, expired ones included
    pub async fn stored(&self) -> usize {
        self.inner.lock().await.entries.len()
    }
}

fn wrong_kind(key: &str, expected: &str, found: &Value) -> StoreError {
    StoreError::InvalidValue {
        key: key.to_string(),
        reason: format!("expected {expected}, found {}", found.kind()),
    }
}

fn live_entry<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
) -> StoreResult<&'a mut Entry> {
    entries
        .get_mut(key)
        .ok_or_else(|| StoreError::Command(format!("entry for {key} vanished under lock")))
}

#[async_trait]
impl KeyedStore for MemoryStore {
    fn driver(&self) -> &str {
        "memory"
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        inner.sweep_if_due(now);
        let entries = &mut inner.entries;

        if entries.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn increment(&self, key: &str, ttl: Duration) -> StoreResult<u64> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        inner.sweep_if_due(now);
        let entries = &mut inner.entries;

        if !entries.get(key).is_some_and(|entry| entry.is_live(now)) {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Counter(1),
                    expires_at: now + ttl,
                },
            );
            return Ok(1);
        }

        let entry = live_entry(entries, key)?;
        match &mut entry.value {
            Value::Counter(count) => {
                *count += 1;
                Ok(*count)
            }
            other => Err(wrong_kind(key, "counter", other)),
        }
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        let inner = self.inner.lock().await;
        let entries = &inner.entries;

        match entries.get(key) {
            Some(entry) if entry.is_live(now) => match &entry.value {
                Value::Text(text) => Ok(Some(text.clone())),
                Value::Counter(count) => Ok(Some(count.to_string())),
                other => Err(wrong_kind(key, "text", other)),
            },
            _ => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.inner.lock().await.entries.remove(key);
        Ok(())
    }

    async fn push_recent(
        &self,
        key: &str,
        value: &str,
        capacity: usize,
        ttl: Duration,
    ) -> StoreResult<()> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        inner.sweep_if_due(now);
        let entries = &mut inner.entries;

        if !entries.get(key).is_some_and(|entry| entry.is_live(now)) {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::List(VecDeque::new()),
                    expires_at: now + ttl,
                },
            );
        }

        let entry = live_entry(entries, key)?;
        match &mut entry.value {
            Value::List(list) => {
                list.push_front(value.to_string());
                list.truncate(capacity);
                Ok(())
            }
            other => Err(wrong_kind(key, "list", other)),
        }
    }

    async fn recent(&self, key: &str) -> StoreResult<Vec<String>> {
        let now = Instant::now();
        let inner = self.inner.lock().await;
        let entries = &inner.entries;

        match entries.get(key) {
            Some(entry) if entry.is_live(now) => match &entry.value {
                Value::List(list) => Ok(list.iter().cloned().collect()),
                other => Err(wrong_kind(key, "list", other)),
            },
            _ => Ok(Vec::new()),
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        drop(self.inner.lock().await);
        Ok(())
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        let now = Instant::now();
        let inner = self.inner.lock().await;
        let entries = &inner.entries;
        let live = entries.values().filter(|entry| entry.is_live(now)).count();

        Ok(StoreStats::from([
            ("keys".to_string(), serde_json::json!(live)),
            ("expired".to_string(), serde_json::json!(entries.len() - live)),
        ]))
    }

    async fn cleanup_expired(&self) -> StoreResult<usize> {
        let removed = self.inner.lock().await.remove_expired(Instant::now());
        debug!("removed {removed} expired entries from memory store");
        Ok(removed)
    }
}
