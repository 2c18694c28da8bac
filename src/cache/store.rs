//! LRU Store Module
//!
//! Single-owner cache engine combining HashMap storage with LRU tracking and
//! TTL expiration. Shared access goes through [`crate::cache::LruCache`].

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use crate::cache::{CacheCounters, CacheEntry, CacheStats, LruTracker};

// == LRU Store ==
/// Bounded key/value store with per-entry TTL and LRU eviction.
#[derive(Debug)]
pub struct LruStore<V> {
    entries: HashMap<String, CacheEntry<V>>,
    lru: LruTracker,
    counters: CacheCounters,
    max_size: usize,
    default_ttl: Duration,
}

impl<V: Clone> LruStore<V> {
    // == Constructor ==
    /// Creates a store holding at most `max_size` entries (clamped to 1).
    ///
    /// `default_ttl` applies to `set` calls without an explicit TTL;
    /// `Duration::ZERO` means entries never expire.
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            counters: CacheCounters::default(),
            max_size: max_size.max(1),
            default_ttl,
        }
    }

    // == Get ==
    /// Returns the value for `key` if present and fresh, marking it most
    /// recently used. Expired entries are removed and counted as misses.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let expired = match self.entries.get(key) {
            None => {
                self.counters.record_miss();
                return None;
            }
            Some(entry) => entry.is_expired(),
        };

        if expired {
            if let Some(entry) = self.entries.remove(key) {
                debug!(key, age = ?entry.age(), "Cache entry expired");
            }
            self.lru.remove(key);
            self.counters.record_miss();
            return None;
        }

        self.lru.touch(key);
        self.counters.record_hit();
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    // == Set ==
    /// Inserts or overwrites `key`, marking it most recently used.
    ///
    /// Inserting a new key into a full store first evicts the least recently
    /// used entry. `ttl` falls back to the store's default.
    pub fn set(&mut self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let ttl = ttl.unwrap_or(self.default_ttl);

        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_size {
            if let Some(evicted) = self.lru.evict_oldest() {
                self.entries.remove(&evicted);
                self.counters.record_eviction();
                debug!(key = %evicted, "Cache eviction");
            }
        }

        self.entries.insert(key.clone(), CacheEntry::new(value, ttl));
        self.lru.touch(&key);
        debug!(key = %key, ?ttl, "Cache set");
    }

    // == Delete ==
    /// Removes `key`. Returns whether it was present.
    pub fn delete(&mut self, key: &str) -> bool {
        if self.entries.remove(key).is_some() {
            self.lru.remove(key);
            debug!(key, "Cache delete");
            true
        } else {
            false
        }
    }

    // == Clear ==
    /// Removes every entry and resets the hit/miss counters. Returns the
    /// number of entries removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        self.lru.clear();
        self.counters.reset();
        removed
    }

    // == Cleanup Expired ==
    /// Removes all expired entries. Returns the number removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.entries.remove(key);
            self.lru.remove(key);
        }

        expired_keys.len()
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        CacheStats::new(self.counters, self.entries.len(), self.max_size)
    }

    /// Checks presence without touching recency, counters, or expiry.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    const HOUR: Duration = Duration::from_secs(3600);

    fn store(max_size: usize) -> LruStore<String> {
        LruStore::new(max_size, HOUR)
    }

    #[test]
    fn test_store_new() {
        let store = store(100);
        assert!(store.is_empty());
        assert_eq!(store.max_size(), 100);
        assert_eq!(store.default_ttl(), HOUR);
    }

    #[test]
    fn test_store_zero_capacity_clamped() {
        let mut store = store(0);
        assert_eq!(store.max_size(), 1);

        store.set("a", "1".into(), None);
        store.set("b", "2".into(), None);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("b"), Some("2".to_string()));
    }

    #[test]
    fn test_store_set_and_get() {
        let mut store = store(100);

        store.set("key1", "value1".into(), None);

        assert_eq!(store.get("key1"), Some("value1".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let mut store = store(100);

        assert_eq!(store.get("nonexistent"), None);
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn test_store_delete() {
        let mut store = store(100);

        store.set("key1", "value1".into(), None);
        assert!(store.delete("key1"));
        assert!(!store.delete("key1"));

        assert!(store.is_empty());
        assert_eq!(store.get("key1"), None);
    }

    #[test]
    fn test_store_overwrite() {
        let mut store = store(100);

        store.set("key1", "value1".into(), None);
        store.set("key1", "value2".into(), None);

        assert_eq!(store.get("key1"), Some("value2".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_overwrite_at_capacity_does_not_evict() {
        let mut store = store(2);

        store.set("a", "1".into(), None);
        store.set("b", "2".into(), None);
        store.set("a", "3".into(), None);

        assert_eq!(store.len(), 2);
        assert_eq!(store.stats().evictions, 0);
        assert!(store.contains("b"));
    }

    #[test]
    fn test_store_ttl_expiration() {
        let mut store = store(100);

        store.set("key1", "value1".into(), Some(Duration::from_millis(10)));
        assert!(store.get("key1").is_some());

        sleep(Duration::from_millis(20));

        assert_eq!(store.get("key1"), None);
        // Lazily purged on access
        assert!(!store.contains("key1"));
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn test_store_zero_ttl_never_expires() {
        let mut store = LruStore::new(10, Duration::from_millis(1));

        store.set("forever", 1u32, Some(Duration::ZERO));
        store.set("brief", 2u32, None);
        sleep(Duration::from_millis(10));

        assert_eq!(store.get("forever"), Some(1));
        assert_eq!(store.get("brief"), None);
    }

    #[test]
    fn test_store_lru_eviction() {
        let mut store = store(3);

        store.set("key1", "value1".into(), None);
        store.set("key2", "value2".into(), None);
        store.set("key3", "value3".into(), None);
        store.set("key4", "value4".into(), None);

        assert_eq!(store.len(), 3);
        assert!(!store.contains("key1"));
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_store_access_reorders_eviction() {
        let mut store = store(3);

        store.set("a", "1".into(), None);
        store.set("b", "2".into(), None);
        store.set("c", "3".into(), None);
        store.get("a");
        store.set("d", "4".into(), None);

        assert!(!store.contains("b"));
        assert!(store.contains("a"));
        assert!(store.contains("c"));
        assert!(store.contains("d"));
    }

    #[test]
    fn test_store_stats() {
        let mut store = LruStore::new(10, HOUR);

        store.set("key1", "value1".to_string(), None);
        store.get("key1");
        store.get("key1");
        store.get("missing");

        let stats = store.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.size, 1);
        assert_eq!(stats.max_size, 10);
    }

    #[test]
    fn test_store_clear_resets_counters() {
        let mut store = store(10);

        store.set("key1", "value1".into(), None);
        store.set("key2", "value2".into(), None);
        store.get("key1");
        store.get("missing");
        assert_eq!(store.clear(), 2);

        let stats = store.stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(store.get("key1"), None);
    }

    #[test]
    fn test_store_cleanup_expired() {
        let mut store = store(100);

        store.set("key1", "value1".into(), Some(Duration::from_millis(10)));
        store.set("key2", "value2".into(), Some(Duration::from_secs(10)));

        sleep(Duration::from_millis(20));

        assert_eq!(store.cleanup_expired(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("key2"), Some("value2".to_string()));
        // Sweeping does not touch counters
        assert_eq!(store.stats().misses, 0);
    }
}
