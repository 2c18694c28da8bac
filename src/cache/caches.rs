//! Application Caches
//!
//! The named caches owned by the service: meta-intelligence and deck-analysis
//! results in memory, plus the disk-backed cache for results that should
//! survive a restart.

use std::io;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::cache::{LruCache, PersistentCache};
use crate::config::Config;

/// Entries removed by one sweep, per cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub meta: usize,
    pub deck: usize,
    pub persistent: usize,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.meta + self.deck + self.persistent
    }
}

#[derive(Debug, Clone)]
pub struct Caches {
    pub meta: LruCache<Value>,
    pub deck: LruCache<Value>,
    pub persistent: PersistentCache,
}

impl Caches {
    pub fn new(meta: LruCache<Value>, deck: LruCache<Value>, persistent: PersistentCache) -> Self {
        Self {
            meta,
            deck,
            persistent,
        }
    }

    /// Builds every cache from configuration, creating the persistent cache
    /// directory if needed.
    pub fn from_config(config: &Config) -> io::Result<Self> {
        Ok(Self::new(
            LruCache::new(config.meta_cache_max_entries, config.meta_cache_ttl()),
            LruCache::new(config.deck_cache_max_entries, config.deck_cache_ttl()),
            PersistentCache::new(&config.persistent_cache_dir, config.persistent_cache_ttl())?,
        ))
    }

    /// Removes expired entries from every cache.
    pub async fn cleanup_expired(&self) -> CleanupReport {
        CleanupReport {
            meta: self.meta.cleanup_expired().await,
            deck: self.deck.cleanup_expired().await,
            persistent: self.persistent.cleanup_expired().await,
        }
    }

    /// Clears the cache called `name` and returns how many entries it held,
    /// or None if no cache has that name.
    pub async fn clear(&self, name: &str) -> Option<usize> {
        let cleared = match name {
            "meta" => self.meta.clear().await,
            "deck" => self.deck.clear().await,
            "persistent" => self.persistent.clear().await,
            _ => return None,
        };
        info!(cache = name, cleared, "Cache cleared on request");
        Some(cleared)
    }
}
