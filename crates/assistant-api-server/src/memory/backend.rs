use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Capacity: {0}")]
    Capacity(String),
}

/// Key-value persistence seam behind the session stores.
///
/// Values are opaque serialized blobs with a per-write TTL. The in-process
/// backend serves single-instance deployments, the Redis backend lets
/// several instances share session memory.
#[async_trait]
pub trait KvBackend: Send + Sync {
    fn kind(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Delete every key under `prefix`, returning how many went away.
    async fn clear_prefix(&self, prefix: &str) -> Result<usize, StoreError>;

    /// Count live keys under `prefix`.
    async fn count_prefix(&self, prefix: &str) -> Result<usize, StoreError>;
}

// ===== IN-PROCESS BACKEND =====

#[derive(Debug, Clone)]
struct StoredEntry {
    value: Bytes,
    expires_at_ms: u64,
}

impl StoredEntry {
    fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Per-process map backend. Expiry is lazy: reads drop dead entries on
/// contact, and the prefix scans purge as they walk.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, StoredEntry>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    fn purge_expired(&self) {
        let now = now_ms();
        self.entries.retain(|_, entry| !entry.is_expired(now));
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired(now_ms()) {
                drop(entry);
                self.entries.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        let expires_at_ms = now_ms().saturating_add(ttl.as_millis() as u64);
        self.entries
            .insert(key.to_string(), StoredEntry { value, expires_at_ms });
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        let removed = keys.len();
        for key in keys {
            self.entries.remove(&key);
        }
        Ok(removed)
    }

    async fn count_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        self.purge_expired();
        Ok(self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .count())
    }
}

// ===== REDIS BACKEND =====

/// Shared backend over a Redis pool. TTLs ride on the keys themselves, so
/// any instance sees the same expiry.
pub struct RedisBackend {
    pool: deadpool_redis::Pool,
}

impl RedisBackend {
    pub fn connect(url: &str) -> Result<Self, StoreError> {
        let cfg = deadpool_redis::Config::from_url(url);
        let pool = cfg
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| StoreError::Backend(format!("redis pool: {e}")))?;
        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Backend(format!("redis connection: {e}")))
    }

    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        use deadpool_redis::redis;

        let mut conn = self.conn().await?;
        let pattern = format!("{prefix}*");
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| StoreError::Backend(format!("redis scan: {e}")))?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }
}

#[async_trait]
impl KvBackend for RedisBackend {
    fn kind(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        use deadpool_redis::redis;

        let mut conn = self.conn().await?;
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(format!("redis get: {e}")))?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        use deadpool_redis::redis;

        let mut conn = self.conn().await?;
        let ttl_ms = (ttl.as_millis() as u64).max(1);
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value.as_ref())
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(format!("redis set: {e}")))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        use deadpool_redis::redis;

        let mut conn = self.conn().await?;
        let _: () = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(format!("redis del: {e}")))?;
        Ok(())
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        use deadpool_redis::redis;

        let keys = self.scan_keys(prefix).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        let mut cmd = redis::cmd("DEL");
        for key in &keys {
            cmd.arg(key);
        }
        let _: () = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(format!("redis del: {e}")))?;
        Ok(keys.len())
    }

    async fn count_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        Ok(self.scan_keys(prefix).await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_set_get_remove() {
        let backend = MemoryBackend::new();
        backend
            .set("chat:s1", Bytes::from_static(b"payload"), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            backend.get("chat:s1").await.unwrap(),
            Some(Bytes::from_static(b"payload"))
        );

        backend.remove("chat:s1").await.unwrap();
        assert_eq!(backend.get("chat:s1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_zero_ttl_expires_immediately() {
        let backend = MemoryBackend::new();
        backend
            .set("chat:s1", Bytes::from_static(b"gone"), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(backend.get("chat:s1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_prefix_operations() {
        let backend = MemoryBackend::new();
        let ttl = Duration::from_secs(60);
        backend.set("chat:s1", Bytes::from_static(b"a"), ttl).await.unwrap();
        backend.set("chat:s2", Bytes::from_static(b"b"), ttl).await.unwrap();
        backend.set("action:s1", Bytes::from_static(b"c"), ttl).await.unwrap();

        assert_eq!(backend.count_prefix("chat:").await.unwrap(), 2);
        assert_eq!(backend.clear_prefix("chat:").await.unwrap(), 2);
        assert_eq!(backend.count_prefix("chat:").await.unwrap(), 0);
        assert_eq!(backend.count_prefix("action:").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_memory_overwrite_refreshes_value() {
        let backend = MemoryBackend::new();
        let ttl = Duration::from_secs(60);
        backend.set("k", Bytes::from_static(b"v1"), ttl).await.unwrap();
        backend.set("k", Bytes::from_static(b"v2"), ttl).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some(Bytes::from_static(b"v2")));
    }
}
