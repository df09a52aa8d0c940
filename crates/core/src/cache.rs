//! # Distributed Cache
//!
//! Shared key/value cache used by every core component: metric query
//! results, trained forecast models and materialized forecast frames all
//! live here under a process-wide namespace prefix.
//!
//! The cache is deliberately forgiving: a backend failure is recorded and
//! degraded to a miss (or a no-op on write) so callers fall back to
//! recomputing. Statistics are process-local monotonic counters.

use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Storage backend behind [`DistributedCache`].
///
/// Values are opaque byte sequences; callers serialize. `delete_matching`
/// takes a glob with a single trailing `*` (prefix match).
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<bool>;
    async fn delete_matching(&self, pattern: &str) -> Result<u64>;
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>>;
    async fn set_many(&self, entries: Vec<(String, Vec<u8>)>, ttl: Option<Duration>) -> Result<()>;
    async fn ping(&self) -> Result<()>;
}

/// Redis-backed implementation. Pattern deletion is SCAN-based and
/// O(matched keys).
pub struct RedisCacheBackend {
    redis: ConnectionManager,
}

impl RedisCacheBackend {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.redis.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.redis.clone();
        match ttl {
            Some(ttl) => conn.set_ex::<_, _, ()>(key, value, ttl.as_secs()).await?,
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.redis.clone();
        let removed: u64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64> {
        let mut conn = self.redis.clone();
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let removed: u64 = conn.del(&keys).await?;
                deleted += removed;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(deleted)
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.redis.clone();
        // MGET with a single key returns a scalar; keep the Vec shape explicit.
        let values: Vec<Option<Vec<u8>>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await?;
        Ok(values)
    }

    async fn set_many(&self, entries: Vec<(String, Vec<u8>)>, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.redis.clone();
        let mut pipe = redis::pipe();
        for (key, value) in &entries {
            match ttl {
                Some(ttl) => {
                    pipe.cmd("SETEX").arg(key).arg(ttl.as_secs()).arg(value);
                }
                None => {
                    pipe.cmd("SET").arg(key).arg(value);
                }
            }
        }
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.redis.clone();
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }
}

/// In-process implementation on a `DashMap`, honoring TTLs lazily on read.
/// Used by tests and as a degraded mode when Redis is unreachable.
#[derive(Default)]
pub struct MemoryCacheBackend {
    entries: DashMap<String, (Vec<u8>, Option<Instant>)>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn live(&self, key: &str) -> Option<Vec<u8>> {
        let entry = self.entries.get(key)?;
        let (value, expires_at) = entry.value();
        if let Some(deadline) = expires_at {
            if Instant::now() >= *deadline {
                drop(entry);
                self.entries.remove(key);
                return None;
            }
        }
        Some(value.clone())
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.live(key))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.insert(key.to_string(), (value, expires_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64> {
        let prefix = pattern.strip_suffix('*').unwrap_or(pattern);
        let matches: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();

        let mut deleted = 0;
        for key in matches {
            if self.entries.remove(&key).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        Ok(keys.iter().map(|key| self.live(key)).collect())
    }

    async fn set_many(&self, entries: Vec<(String, Vec<u8>)>, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        for (key, value) in entries {
            self.entries.insert(key, (value, expires_at));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Snapshot of the cache counters.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub total_operations: u64,
    pub hit_rate: f64,
}

/// Namespaced cache facade shared by all core components.
pub struct DistributedCache {
    prefix: String,
    backend: Arc<dyn CacheBackend>,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
}

impl DistributedCache {
    pub fn new(prefix: impl Into<String>, backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            prefix: prefix.into(),
            backend,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    /// Get a raw value. Backend failures degrade to a miss.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let full_key = self.full_key(key);
        match self.backend.get(&full_key).await {
            Ok(Some(value)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %full_key, "cache hit");
                Some(value)
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %full_key, "cache miss");
                None
            }
            Err(e) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                warn!(key = %full_key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Set a raw value. `ttl = None` means no expiration.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> bool {
        let full_key = self.full_key(key);
        match self.backend.set(&full_key, value, ttl).await {
            Ok(()) => {
                self.sets.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                warn!(key = %full_key, error = %e, "cache write failed");
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        let full_key = self.full_key(key);
        match self.backend.delete(&full_key).await {
            Ok(removed) => {
                self.deletes.fetch_add(1, Ordering::Relaxed);
                removed
            }
            Err(e) => {
                warn!(key = %full_key, error = %e, "cache delete failed");
                false
            }
        }
    }

    /// Delete every key matching a prefix-glob (e.g. `forecast:product:7:*`).
    /// Returns the number of keys removed.
    pub async fn delete_pattern(&self, pattern: &str) -> u64 {
        let full_pattern = self.full_key(pattern);
        match self.backend.delete_matching(&full_pattern).await {
            Ok(count) => {
                self.deletes.fetch_add(count, Ordering::Relaxed);
                debug!(pattern = %full_pattern, count, "cache pattern delete");
                count
            }
            Err(e) => {
                warn!(pattern = %full_pattern, error = %e, "cache pattern delete failed");
                0
            }
        }
    }

    /// Multi-get. The result maps each found key (without prefix) to its value.
    pub async fn get_many(&self, keys: &[String]) -> Vec<(String, Vec<u8>)> {
        let full_keys: Vec<String> = keys.iter().map(|key| self.full_key(key)).collect();
        match self.backend.get_many(&full_keys).await {
            Ok(values) => {
                let mut found = Vec::new();
                for (key, value) in keys.iter().zip(values) {
                    match value {
                        Some(value) => {
                            self.hits.fetch_add(1, Ordering::Relaxed);
                            found.push((key.clone(), value));
                        }
                        None => {
                            self.misses.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
                found
            }
            Err(e) => {
                self.misses
                    .fetch_add(keys.len() as u64, Ordering::Relaxed);
                warn!(error = %e, "cache multi-get failed, treating as misses");
                Vec::new()
            }
        }
    }

    pub async fn set_many(&self, entries: Vec<(String, Vec<u8>)>, ttl: Option<Duration>) -> bool {
        let count = entries.len() as u64;
        let full_entries: Vec<(String, Vec<u8>)> = entries
            .into_iter()
            .map(|(key, value)| (self.full_key(&key), value))
            .collect();
        match self.backend.set_many(full_entries, ttl).await {
            Ok(()) => {
                self.sets.fetch_add(count, Ordering::Relaxed);
                true
            }
            Err(e) => {
                warn!(error = %e, "cache multi-set failed");
                false
            }
        }
    }

    /// Typed convenience: JSON-decode a cached value.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.get(key).await?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "cached value failed to decode, dropping");
                self.delete(key).await;
                None
            }
        }
    }

    /// Typed convenience: JSON-encode and store a value.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> bool {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.set(key, bytes, ttl).await,
            Err(e) => {
                warn!(key, error = %e, "value failed to encode for caching");
                false
            }
        }
    }

    pub async fn ping(&self) -> Result<()> {
        self.backend.ping().await
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let sets = self.sets.load(Ordering::Relaxed);
        let deletes = self.deletes.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            hits,
            misses,
            sets,
            deletes,
            total_operations: hits + misses + sets + deletes,
            hit_rate: if lookups > 0 {
                (hits as f64 / lookups as f64 * 10_000.0).round() / 100.0
            } else {
                0.0
            },
        }
    }

    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.sets.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
    }
}
