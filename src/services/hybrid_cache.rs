use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::db::cache_queries::{CacheRow, CacheStore};
use crate::services::clock::Clock;

/// Bump to invalidate every cached value after a format change.
const CACHE_VERSION: &str = "v1";

struct L1Entry {
    value: Vec<u8>,
    expires_at: DateTime<Utc>,
    /// Monotonic access stamp; smallest = least recently used.
    last_access: u64,
}

struct L1Cache {
    entries: HashMap<String, L1Entry>,
    access_counter: u64,
    max_entries: usize,
}

impl L1Cache {
    fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            access_counter: 0,
            max_entries,
        }
    }

    fn touch(&mut self) -> u64 {
        self.access_counter += 1;
        self.access_counter
    }

    fn get(&mut self, key: &str, now: DateTime<Utc>) -> Option<Vec<u8>> {
        let stamp = self.touch();
        match self.entries.get_mut(key) {
            Some(entry) if now < entry.expires_at => {
                entry.last_access = stamp;
                Some(entry.value.clone())
            }
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn insert(&mut self, key: String, value: Vec<u8>, expires_at: DateTime<Utc>) {
        let stamp = self.touch();
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.evict_lru();
        }
        self.entries.insert(
            key,
            L1Entry {
                value,
                expires_at,
                last_access: stamp,
            },
        );
    }

    fn evict_lru(&mut self) {
        if let Some(key) = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(key, _)| key.clone())
        {
            self.entries.remove(&key);
            tracing::debug!(%key, "L1 evicted");
        }
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }
}

/// Two-tier cache: L1 in-memory LRU under one mutex, L2 durable store with
/// per-key TTL. Values are opaque JSON bytes; the cache never deserializes.
pub struct HybridCache {
    l1: Mutex<L1Cache>,
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
}

impl HybridCache {
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>, l1_max_entries: usize) -> Self {
        Self {
            l1: Mutex::new(L1Cache::new(l1_max_entries)),
            store,
            clock,
        }
    }

    fn versioned(key: &str) -> String {
        format!("{}:{}", CACHE_VERSION, key)
    }

    /// L1 first, then L2 with promotion. Expired rows are deleted lazily and
    /// reported as misses; an expired value is never returned.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let key = Self::versioned(key);
        let now = self.clock.now_utc();

        if let Some(value) = self.l1.lock().get(&key, now) {
            tracing::debug!(%key, "Cache L1 HIT");
            return Some(value);
        }

        let row = match self.store.get(&key).await {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(%key, error = %e, "L2 cache read error");
                return None;
            }
        };

        let row = row?;
        if now >= row.expires_at {
            tracing::debug!(%key, "Cache L2 EXPIRED");
            if let Err(e) = self.store.delete(&key).await {
                tracing::warn!(%key, error = %e, "Failed to delete expired cache row");
            }
            return None;
        }

        // Corrupt values are deleted and treated as a miss, never surfaced.
        if serde_json::from_slice::<serde_json::Value>(&row.value).is_err() {
            tracing::warn!(%key, "Corrupt L2 cache value; deleting");
            if let Err(e) = self.store.delete(&key).await {
                tracing::warn!(%key, error = %e, "Failed to delete corrupt cache row");
            }
            return None;
        }

        tracing::debug!(%key, "Cache L2 HIT, promoting to L1");
        self.l1
            .lock()
            .insert(key.clone(), row.value.clone(), row.expires_at);
        Some(row.value)
    }

    /// Write both tiers. An L2 failure leaves L1 populated and logs the
    /// degradation.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let key = Self::versioned(key);
        let now = self.clock.now_utc();
        let expires_at = now + ttl;

        self.l1.lock().insert(key.clone(), value.clone(), expires_at);

        let row = CacheRow {
            value,
            inserted_at: now,
            expires_at,
        };
        if let Err(e) = self.store.put(&key, &row).await {
            tracing::error!(%key, error = %e, "L2 cache write failed; serving from L1 only");
        }
    }

    /// Typed convenience wrappers over the byte interface.
    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.get(key).await?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(%key, error = %e, "Cached value did not match expected shape");
                self.delete(key).await;
                None
            }
        }
    }

    pub async fn set_json<T: serde::Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.set(key, bytes, ttl).await,
            Err(e) => tracing::error!(%key, error = %e, "Failed to serialize cache value"),
        }
    }

    pub async fn delete(&self, key: &str) {
        let key = Self::versioned(key);
        self.l1.lock().remove(&key);
        if let Err(e) = self.store.delete(&key).await {
            tracing::warn!(%key, error = %e, "Failed to delete from L2 cache");
        }
    }

    /// Bulk-delete expired L2 rows; invoked by the weekly-cleanup job.
    pub async fn cleanup_expired(&self) -> u64 {
        match self.store.delete_expired(self.clock.now_utc()).await {
            Ok(deleted) => {
                if deleted > 0 {
                    tracing::info!(deleted, "Cleaned up expired cache entries");
                }
                deleted
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to clean up expired cache entries");
                0
            }
        }
    }
}

/// In-memory `CacheStore`, used by tests and available as a degraded mode
/// when the durable substrate is absent.
#[derive(Default)]
pub struct InMemoryCacheStore {
    rows: Mutex<HashMap<String, CacheRow>>,
    pub fail_writes: std::sync::atomic::AtomicBool,
}

#[async_trait::async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheRow>, sqlx::Error> {
        Ok(self.rows.lock().get(key).cloned())
    }

    async fn put(&self, key: &str, row: &CacheRow) -> Result<(), sqlx::Error> {
        if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(sqlx::Error::PoolClosed);
        }
        self.rows.lock().insert(key.to_string(), row.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), sqlx::Error> {
        self.rows.lock().remove(key);
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|_, row| row.expires_at > now);
        Ok((before - rows.len()) as u64)
    }
}
