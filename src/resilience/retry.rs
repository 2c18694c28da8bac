//! Retry Controller
//!
//! Re-runs a fallible async operation on transient failures with exponential
//! backoff and optional jitter.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

use crate::error::{Classify, ErrorKind};

/// Jittered delays fall in `[JITTER_FLOOR, 1.0]` times the computed delay.
const JITTER_FLOOR: f64 = 0.5;

// == Retry Policy ==
/// Immutable retry configuration.
///
/// Only errors whose [`ErrorKind`] is in the policy's retryable set are
/// retried; any other error is returned after the first attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    exponential_base: f64,
    jitter: bool,
    retry_on: Vec<ErrorKind>,
}

impl Default for RetryPolicy {
    /// 3 attempts, 1 s base delay doubling up to 60 s, jitter on, transient
    /// kinds retried.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: true,
            retry_on: ErrorKind::TRANSIENT.to_vec(),
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total attempts including the first; clamped to at least 1.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_exponential_base(mut self, exponential_base: f64) -> Self {
        self.exponential_base = exponential_base;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Replaces the set of retryable kinds.
    pub fn retry_on(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retry_on = kinds.into_iter().collect();
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retry_on.contains(&kind)
    }

    // == Delay ==
    /// Backoff before retry number `attempt` (zero-based):
    /// `min(base * exponential_base^attempt, max)`, scaled into
    /// `[0.5, 1.0]` of itself when jitter is enabled.
    pub fn delay(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let raw = self.base_delay.as_secs_f64() * self.exponential_base.powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64());
        let secs = if self.jitter {
            capped * (JITTER_FLOOR + fastrand::f64() * (1.0 - JITTER_FLOOR))
        } else {
            capped
        };

        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }

    // == Run ==
    /// Runs `op` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` attempts have failed; the last error is returned.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        let mut attempt: u32 = 0;
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let kind = err.kind();
            if !self.is_retryable(kind) {
                error!(?kind, "Non-retryable error: {}", err);
                return Err(err);
            }

            attempt += 1;
            if attempt >= self.max_attempts {
                error!(?kind, "All {} attempts failed: {}", self.max_attempts, err);
                return Err(err);
            }

            let delay = self.delay(attempt - 1);
            warn!(
                ?kind,
                "Attempt {}/{} failed: {}. Retrying in {:.2}s",
                attempt,
                self.max_attempts,
                err,
                delay.as_secs_f64()
            );
            tokio::time::sleep(delay).await;
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use crate::error::UpstreamError;

    fn fixed(base_ms: u64) -> RetryPolicy {
        RetryPolicy::new()
            .with_base_delay(Duration::from_millis(base_ms))
            .with_jitter(false)
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(60));
        assert_eq!(policy.exponential_base, 2.0);
        assert!(policy.jitter);
        for kind in ErrorKind::TRANSIENT {
            assert!(policy.is_retryable(kind));
        }
        assert!(!policy.is_retryable(ErrorKind::InvalidInput));
    }

    #[test]
    fn test_max_attempts_clamped() {
        assert_eq!(RetryPolicy::new().with_max_attempts(0).max_attempts(), 1);
    }

    #[test]
    fn test_delay_exponential() {
        let policy = fixed(1000);

        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_custom_base() {
        let policy = fixed(500).with_exponential_base(3.0);

        assert_eq!(policy.delay(0), Duration::from_millis(500));
        assert_eq!(policy.delay(2), Duration::from_millis(4500));
    }

    #[test]
    fn test_delay_capped() {
        let policy = fixed(1000).with_max_delay(Duration::from_secs(5));

        assert_eq!(policy.delay(10), Duration::from_secs(5));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_delay_zero_base() {
        let policy = fixed(0);
        assert_eq!(policy.delay(50), Duration::ZERO);
    }

    #[test]
    fn test_delay_jitter_bounds() {
        let policy = RetryPolicy::new().with_base_delay(Duration::from_secs(2));

        for _ in 0..200 {
            let delay = policy.delay(1);
            assert!(delay >= Duration::from_secs(2));
            assert!(delay <= Duration::from_secs(4));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_invokes_once() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = RetryPolicy::default()
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, UpstreamError>("success")
            })
            .await;

        assert_eq!(result, Ok("success"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = fixed(10)
            .with_max_attempts(4)
            .run(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err(UpstreamError::Network(format!("failure {n}")))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(result, Err(UpstreamError::Network("failure 3".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_invoked_once() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = fixed(10)
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(UpstreamError::InvalidInput("bad deck list".into()))
            })
            .await;

        assert!(matches!(result, Err(UpstreamError::InvalidInput(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);

        let result = fixed(10)
            .run(|| async {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 => Err(UpstreamError::RateLimited("429".into())),
                    1 => Err(UpstreamError::Timeout("slow".into())),
                    _ => Ok(42),
                }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let start = Instant::now();

        let _: Result<(), _> = fixed(1000)
            .run(|| async { Err(UpstreamError::ServiceUnavailable("503".into())) })
            .await;

        // 1s before the 2nd attempt, 2s before the 3rd, none after the last
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_millis(3100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_retryable_set() {
        let calls = AtomicU32::new(0);
        let policy = fixed(10).retry_on([ErrorKind::Timeout]);

        let result: Result<(), _> = policy
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(UpstreamError::Network("reset".into()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
