//! Cache Entry Module
//!
//! Defines the value-plus-freshness unit stored by both caches.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

// == Cache Entry ==
/// A cached value with its insertion time and time-to-live.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Insertion time, as a duration since the Unix epoch
    pub created_at: Duration,
    /// Lifetime of the entry; `Duration::ZERO` means it never expires
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates an entry stamped with the current time.
    pub fn new(value: V, ttl: Duration) -> Self {
        Self::with_created_at(value, now_since_epoch(), ttl)
    }

    /// Creates an entry with an explicit insertion time.
    pub fn with_created_at(value: V, created_at: Duration, ttl: Duration) -> Self {
        Self {
            value,
            created_at,
            ttl,
        }
    }

    // == Is Expired ==
    /// Checks the entry against the current time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_since_epoch())
    }

    /// Checks the entry against `now`.
    ///
    /// Expired iff the TTL is non-zero and strictly more than `ttl` has elapsed
    /// since insertion; an entry exactly `ttl` old is still fresh.
    pub fn is_expired_at(&self, now: Duration) -> bool {
        is_expired(self.created_at, self.ttl, now)
    }

    // == Age ==
    /// Time elapsed since insertion.
    pub fn age(&self) -> Duration {
        now_since_epoch().saturating_sub(self.created_at)
    }

    // == Time To Live ==
    /// Remaining lifetime, or None if the entry never expires.
    ///
    /// Returns `Some(Duration::ZERO)` once the entry has expired.
    pub fn ttl_remaining(&self) -> Option<Duration> {
        if self.ttl.is_zero() {
            return None;
        }
        Some(self.ttl.saturating_sub(self.age()))
    }
}

// == Utility Functions ==
/// Current wall-clock time as a duration since the Unix epoch.
pub fn now_since_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

/// Shared expiry predicate for in-memory entries and on-disk records.
pub(crate) fn is_expired(created_at: Duration, ttl: Duration, now: Duration) -> bool {
    !ttl.is_zero() && now.saturating_sub(created_at) > ttl
}
