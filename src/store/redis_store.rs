//! Redis keyed store
//!
//! Shared between every process of the site, so the dedup claim and the
//! counters hold across the web workers and the monitor. Relies on `SET NX EX`
//! for claims and on `MULTI`/`EXEC` pipelines for counters and lists.
//! `EXPIRE ... NX` needs Redis 7 or newer.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, instrument};

use super::backend::{KeyedStore, StoreStats};
use super::error::{StoreError, StoreResult};

/// `INFO` fields surfaced in the cache probe
const REPORTED_INFO_FIELDS: [&str; 6] = [
    "redis_version",
    "connected_clients",
    "used_memory_human",
    "keyspace_hits",
    "keyspace_misses",
    "uptime_in_seconds",
];

pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    #[instrument(skip_all)]
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        debug!("connected to redis store");
        Ok(Self { manager })
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Pick the reported fields out of an `INFO` reply.
fn parse_info(info: &str) -> StoreStats {
    info.lines()
        .filter_map(|line| line.trim().split_once(':'))
        .filter(|(key, _)| REPORTED_INFO_FIELDS.contains(key))
        .map(|(key, value)| {
            let value = value
                .parse::<u64>()
                .map(serde_json::Value::from)
                .unwrap_or_else(|_| serde_json::Value::from(value));
            (key.to_string(), value)
        })
        .collect()
}

#[async_trait]
impl KeyedStore for RedisStore {
    fn driver(&self) -> &str {
        "redis"
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.manager.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> StoreResult<u64> {
        let mut conn = self.manager.clone();
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(key)
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl_secs(ttl))
            .arg("NX")
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.manager.clone();
        let _: u64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }

    async fn push_recent(
        &self,
        key: &str,
        value: &str,
        capacity: usize,
        ttl: Duration,
    ) -> StoreResult<()> {
        if capacity == 0 {
            return Ok(());
        }

        let mut conn = self.manager.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("LPUSH")
            .arg(key)
            .arg(value)
            .ignore()
            .cmd("LTRIM")
            .arg(key)
            .arg(0)
            .arg(capacity as i64 - 1)
            .ignore()
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl_secs(ttl))
            .arg("NX")
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn recent(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.manager.clone();
        let values: Vec<String> = redis::cmd("LRANGE")
            .arg(key)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?;
        Ok(values)
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.manager.clone();
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        if reply != "PONG" {
            return Err(StoreError::Command(format!("unexpected PING reply: {reply}")));
        }
        Ok(())
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        let mut conn = self.manager.clone();
        let info: String = redis::cmd("INFO").query_async(&mut conn).await?;
        Ok(parse_info(&info))
    }

    async fn cleanup_expired(&self) -> StoreResult<usize> {
        // keys expire natively
        Ok(0)
    }
}
