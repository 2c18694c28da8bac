//! Guard
//!
//! Wraps calls to one upstream service in its resilience primitives, innermost
//! to outermost: rate limiter, circuit breaker, retry, then an optional cache
//! in front. Every layer is optional.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::cache::{LruCache, PersistentCache};
use crate::error::{CircuitOpen, Classify};
use crate::resilience::{BreakerSnapshot, CircuitBreaker, LimiterSnapshot, RateLimiter, RetryPolicy};

/// Serializable view of a guard for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuardSnapshot {
    pub name: String,
    pub circuit_breaker: Option<BreakerSnapshot>,
    pub rate_limiter: Option<LimiterSnapshot>,
    pub retry_max_attempts: Option<u32>,
}

// == Guard ==
/// Cheap to clone: the breaker and limiter are shared between clones.
#[derive(Debug, Clone)]
pub struct Guard {
    name: String,
    limiter: Option<Arc<RateLimiter>>,
    breaker: Option<Arc<CircuitBreaker>>,
    retry: Option<RetryPolicy>,
}

impl Guard {
    /// A guard with no layers; calls pass straight through.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            limiter: None,
            breaker: None,
            retry: None,
        }
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(Arc::new(limiter));
        self
    }

    pub fn with_circuit_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = Some(Arc::new(breaker));
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn circuit_breaker(&self) -> Option<&CircuitBreaker> {
        self.breaker.as_deref()
    }

    pub fn rate_limiter(&self) -> Option<&RateLimiter> {
        self.limiter.as_deref()
    }

    // == Call ==
    /// Runs `op` through every configured layer.
    ///
    /// Each retry attempt goes back through the breaker and the limiter, so
    /// an attempt rejected by an open breaker consumes no tokens.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + From<CircuitOpen> + Display,
    {
        let op = &op;
        match &self.retry {
            Some(policy) => policy.run(move || self.attempt(op)).await,
            None => self.attempt(op).await,
        }
    }

    /// Like [`Self::call`], with `cache` in front: a hit skips every layer and
    /// only a success is written back.
    pub async fn cached_call<V, E, F, Fut>(
        &self,
        cache: &LruCache<V>,
        key: &str,
        ttl: Option<Duration>,
        op: F,
    ) -> Result<V, E>
    where
        V: Clone,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Classify + From<CircuitOpen> + Display,
    {
        cache.get_or_insert_with(key, ttl, || self.call(op)).await
    }

    /// Like [`Self::cached_call`] over the disk cache, for results that
    /// should survive a restart.
    pub async fn persisted_call<V, E, F, Fut>(
        &self,
        cache: &PersistentCache,
        key: &str,
        ttl: Option<Duration>,
        op: F,
    ) -> Result<V, E>
    where
        V: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Classify + From<CircuitOpen> + Display,
    {
        if let Some(value) = cache.get(key).await {
            debug!(guard = %self.name, key, "Serving persisted result");
            return Ok(value);
        }

        let value = self.call(op).await?;
        cache.set(key, &value, ttl).await;
        Ok(value)
    }

    pub fn snapshot(&self) -> GuardSnapshot {
        GuardSnapshot {
            name: self.name.clone(),
            circuit_breaker: self.breaker.as_ref().map(|b| b.snapshot()),
            rate_limiter: self.limiter.as_ref().map(|l| l.snapshot()),
            retry_max_attempts: self.retry.as_ref().map(RetryPolicy::max_attempts),
        }
    }

    async fn attempt<T, E, F, Fut>(&self, op: &F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + From<CircuitOpen> + Display,
    {
        match &self.breaker {
            Some(breaker) => breaker.call(|| self.limited(op)).await,
            None => self.limited(op).await,
        }
    }

    async fn limited<T, F, Fut>(&self, op: &F) -> T
    where
        F: Fn() -> Fut,
        Fut: Future<Output = T>,
    {
        if let Some(limiter) = &self.limiter {
            limiter.acquire(1).await;
        }
        op().await
    }
}
