//! In-Memory Cache Module
//!
//! Cloneable, concurrency-safe handle over an [`LruStore`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cache::{CacheStats, LruStore};

// == LRU Cache ==
/// Shared LRU cache with per-entry TTL.
///
/// Every operation runs inside one critical section, so eviction, expiry and
/// reordering never interleave. Clones share the same underlying store.
#[derive(Debug)]
pub struct LruCache<V> {
    inner: Arc<Mutex<LruStore<V>>>,
}

impl<V> Clone for LruCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: Clone> LruCache<V> {
    /// Creates a cache holding at most `max_size` entries.
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LruStore::new(max_size, default_ttl))),
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        self.inner.lock().await.get(key)
    }

    pub async fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        self.inner.lock().await.set(key, value, ttl);
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.inner.lock().await.delete(key)
    }

    /// Empties the cache. Returns the number of entries it held.
    pub async fn clear(&self) -> usize {
        let removed = self.inner.lock().await.clear();
        info!("Cache cleared ({} entries)", removed);
        removed
    }

    /// Removes every expired entry. Returns the number removed.
    pub async fn cleanup_expired(&self) -> usize {
        let removed = self.inner.lock().await.cleanup_expired();
        if removed > 0 {
            info!("Cleaned up {} expired cache entries", removed);
        }
        removed
    }

    pub async fn stats(&self) -> CacheStats {
        self.inner.lock().await.stats()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    // == Get Or Insert ==
    /// Returns the cached value for `key`, or runs `f`, caches its success
    /// and returns it.
    ///
    /// Errors from `f` propagate and are never cached. The lock is not held
    /// while `f` runs, so concurrent misses on the same key may each compute.
    pub async fn get_or_insert_with<F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        f: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        debug!(key, "Cache miss, computing value");
        let value = f().await?;
        self.set(key, value.clone(), ttl).await;
        Ok(value)
    }
}
