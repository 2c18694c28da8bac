//! Configuration Module
//!
//! Loads cache, resilience and server settings from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Service configuration.
///
/// Every value can be set through an environment variable; missing or
/// unparseable values fall back to [`Config::default`].
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Capacity of the meta-intelligence cache
    pub meta_cache_max_entries: usize,
    /// Default TTL in seconds of the meta-intelligence cache
    pub meta_cache_ttl: u64,
    /// Capacity of the deck-analysis cache
    pub deck_cache_max_entries: usize,
    /// Default TTL in seconds of the deck-analysis cache
    pub deck_cache_ttl: u64,
    /// Directory holding persistent cache records
    pub persistent_cache_dir: PathBuf,
    /// Default TTL in seconds of persistent records
    pub persistent_cache_ttl: u64,
    /// Background cleanup interval in seconds
    pub cleanup_interval: u64,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub breaker_failure_threshold: u32,
    /// Seconds an open breaker waits before admitting a trial call
    pub breaker_recovery_timeout: u64,
    /// AI provider tokens per second
    pub ai_rate_limit: f64,
    pub ai_rate_burst: u32,
    /// Card-price lookups per second
    pub price_rate_limit: f64,
    pub price_rate_burst: u32,
}

impl Config {
    /// Creates a Config from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` (default: 3000)
    /// - `META_CACHE_MAX_ENTRIES` / `META_CACHE_TTL` (default: 100 / 3600)
    /// - `DECK_CACHE_MAX_ENTRIES` / `DECK_CACHE_TTL` (default: 500 / 1800)
    /// - `PERSISTENT_CACHE_DIR` / `PERSISTENT_CACHE_TTL` (default: data/cache / 86400)
    /// - `CLEANUP_INTERVAL` (default: 60)
    /// - `RETRY_MAX_ATTEMPTS` (default: 3)
    /// - `RETRY_BASE_DELAY_MS` / `RETRY_MAX_DELAY_MS` (default: 1000 / 60000)
    /// - `BREAKER_FAILURE_THRESHOLD` / `BREAKER_RECOVERY_TIMEOUT` (default: 5 / 60)
    /// - `AI_RATE_LIMIT` / `AI_RATE_BURST` (default: 2.0 / 5)
    /// - `PRICE_RATE_LIMIT` / `PRICE_RATE_BURST` (default: 10.0 / 10)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: env_or("SERVER_PORT", defaults.server_port),
            meta_cache_max_entries: env_or("META_CACHE_MAX_ENTRIES", defaults.meta_cache_max_entries),
            meta_cache_ttl: env_or("META_CACHE_TTL", defaults.meta_cache_ttl),
            deck_cache_max_entries: env_or("DECK_CACHE_MAX_ENTRIES", defaults.deck_cache_max_entries),
            deck_cache_ttl: env_or("DECK_CACHE_TTL", defaults.deck_cache_ttl),
            persistent_cache_dir: env_or("PERSISTENT_CACHE_DIR", defaults.persistent_cache_dir),
            persistent_cache_ttl: env_or("PERSISTENT_CACHE_TTL", defaults.persistent_cache_ttl),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
            retry_max_attempts: env_or("RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts),
            retry_base_delay_ms: env_or("RETRY_BASE_DELAY_MS", defaults.retry_base_delay_ms),
            retry_max_delay_ms: env_or("RETRY_MAX_DELAY_MS", defaults.retry_max_delay_ms),
            breaker_failure_threshold: env_or(
                "BREAKER_FAILURE_THRESHOLD",
                defaults.breaker_failure_threshold,
            ),
            breaker_recovery_timeout: env_or(
                "BREAKER_RECOVERY_TIMEOUT",
                defaults.breaker_recovery_timeout,
            ),
            ai_rate_limit: positive_or("AI_RATE_LIMIT", defaults.ai_rate_limit),
            ai_rate_burst: env_or("AI_RATE_BURST", defaults.ai_rate_burst),
            price_rate_limit: positive_or("PRICE_RATE_LIMIT", defaults.price_rate_limit),
            price_rate_burst: env_or("PRICE_RATE_BURST", defaults.price_rate_burst),
        }
    }

    pub fn meta_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.meta_cache_ttl)
    }

    pub fn deck_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.deck_cache_ttl)
    }

    pub fn persistent_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.persistent_cache_ttl)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval)
    }

    pub fn breaker_recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.breaker_recovery_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            meta_cache_max_entries: 100,
            meta_cache_ttl: 3600,
            deck_cache_max_entries: 500,
            deck_cache_ttl: 1800,
            persistent_cache_dir: PathBuf::from("data/cache"),
            persistent_cache_ttl: 86_400,
            cleanup_interval: 60,
            retry_max_attempts: 3,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 60_000,
            breaker_failure_threshold: 5,
            breaker_recovery_timeout: 60,
            ai_rate_limit: 2.0,
            ai_rate_burst: 5,
            price_rate_limit: 10.0,
            price_rate_burst: 10,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Rates must stay positive and finite for the token bucket.
fn positive_or(name: &str, default: f64) -> f64 {
    Some(env_or(name, default))
        .filter(|rate| rate.is_finite() && *rate > 0.0)
        .unwrap_or(default)
}
