//! Token Bucket Rate Limiter
//!
//! Callers wait for tokens instead of being rejected. Waiters are served in
//! arrival order: a fair queue lock is held while a caller sleeps for its
//! deficit. The bucket itself sits behind a separate lock that is never held
//! across an await, so reading the level never waits on throttled callers.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Shortest sleep while waiting for tokens; the paused test clock would
/// otherwise spin on sub-millisecond deficits.
const MIN_WAIT: Duration = Duration::from_millis(1);

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, rate: f64, capacity: f64) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
        self.last_refill = now;
    }
}

/// Serializable view of a limiter for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LimiterSnapshot {
    pub name: String,
    pub rate: f64,
    pub burst: u32,
    pub available: f64,
}

// == Rate Limiter ==
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    rate: f64,
    burst: u32,
    bucket: Mutex<Bucket>,
    /// Held by the caller at the head of the line, across its sleep
    queue: tokio::sync::Mutex<()>,
}

impl RateLimiter {
    /// A full bucket of `burst` tokens refilled at `rate` tokens per second.
    ///
    /// # Panics
    /// If `rate` is not a positive finite number.
    pub fn new(name: impl Into<String>, rate: f64, burst: u32) -> Self {
        assert!(
            rate.is_finite() && rate > 0.0,
            "rate limiter rate must be positive and finite, got {rate}"
        );
        let burst = burst.max(1);
        Self {
            name: name.into(),
            rate,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: f64::from(burst),
                last_refill: Instant::now(),
            }),
            queue: tokio::sync::Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    // == Acquire ==
    /// Waits until `tokens` tokens are available and consumes them.
    ///
    /// Zero tokens returns immediately. Requests larger than the burst can
    /// never be satisfied in one go and are clamped to the burst.
    pub async fn acquire(&self, tokens: u32) {
        if tokens == 0 {
            return;
        }
        let needed = f64::from(self.clamp(tokens));

        let _turn = self.queue.lock().await;
        loop {
            let deficit = match self.take(needed) {
                Ok(()) => return,
                Err(deficit) => deficit,
            };
            let wait = Duration::try_from_secs_f64(deficit / self.rate)
                .unwrap_or(MIN_WAIT)
                .max(MIN_WAIT);
            debug!(
                limiter = %self.name,
                "Rate limit reached, waiting {:.3}s",
                wait.as_secs_f64()
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Consumes `tokens` only if they are available right now and nobody is
    /// already waiting.
    pub fn try_acquire(&self, tokens: u32) -> bool {
        if tokens == 0 {
            return true;
        }
        let Ok(_turn) = self.queue.try_lock() else {
            return false;
        };
        self.take(f64::from(self.clamp(tokens))).is_ok()
    }

    /// Tokens currently in the bucket after refilling. Never waits on
    /// throttled callers.
    pub fn available(&self) -> f64 {
        let mut bucket = self.lock_bucket();
        bucket.refill(self.rate, f64::from(self.burst));
        bucket.tokens
    }

    /// Acquires `tokens`, then runs `op`.
    pub async fn run<T, F, Fut>(&self, tokens: u32, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.acquire(tokens).await;
        op().await
    }

    pub fn snapshot(&self) -> LimiterSnapshot {
        LimiterSnapshot {
            name: self.name.clone(),
            rate: self.rate,
            burst: self.burst,
            available: self.available(),
        }
    }

    fn lock_bucket(&self) -> MutexGuard<'_, Bucket> {
        self.bucket.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refills, then consumes `needed` tokens if present. Otherwise returns
    /// the missing amount.
    fn take(&self, needed: f64) -> Result<(), f64> {
        let mut bucket = self.lock_bucket();
        bucket.refill(self.rate, f64::from(self.burst));
        if bucket.tokens >= needed {
            bucket.tokens -= needed;
            Ok(())
        } else {
            Err(needed - bucket.tokens)
        }
    }

    fn clamp(&self, tokens: u32) -> u32 {
        if tokens > self.burst {
            warn!(
                limiter = %self.name,
                "Requested {} tokens exceeds burst {}, clamping",
                tokens,
                self.burst
            );
            self.burst
        } else {
            tokens
        }
    }
}
