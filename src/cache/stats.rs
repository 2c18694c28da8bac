//! Cache Statistics Module
//!
//! Running hit/miss/eviction counters and the snapshot reported to callers.

use serde::Serialize;

// == Cache Counters ==
/// Running counters owned by an LRU store.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheCounters {
    /// Lookups that returned a fresh value
    pub hits: u64,
    /// Lookups that found nothing or an expired entry
    pub misses: u64,
    /// Entries dropped to make room for new keys
    pub evictions: u64,
}

impl CacheCounters {
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// == Cache Stats ==
/// Point-in-time statistics of an LRU cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    /// Current number of entries
    pub size: usize,
    /// Capacity
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// hits / (hits + misses), or 0.0 before any lookup
    pub hit_rate: f64,
    /// size / max_size
    pub utilization: f64,
}

impl CacheStats {
    /// Builds a snapshot from the counters and current occupancy.
    pub fn new(counters: CacheCounters, size: usize, max_size: usize) -> Self {
        let total = counters.hits + counters.misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            counters.hits as f64 / total as f64
        };
        let utilization = if max_size == 0 {
            0.0
        } else {
            size as f64 / max_size as f64
        };

        Self {
            size,
            max_size,
            hits: counters.hits,
            misses: counters.misses,
            evictions: counters.evictions,
            hit_rate,
            utilization,
        }
    }
}
