//! Circuit Breaker
//!
//! Fails fast once a guarded operation keeps failing, then lets a single
//! trial call through after a recovery timeout to test whether it recovered.
//!
//! ```text
//!            failures >= threshold
//!   CLOSED ------------------------> OPEN
//!     ^                               |  recovery timeout elapsed,
//!     |  trial succeeds               v  next call becomes the trial
//!     +-------------------------- HALF_OPEN
//!                                     |  trial fails
//!                                     +--------------> OPEN
//! ```

use std::fmt::Display;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{CircuitOpen, Classify, ErrorKind};

// == Circuit State ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls pass through
    Closed,
    /// Calls are rejected without reaching the operation
    Open,
    /// One trial call decides between CLOSED and OPEN
    HalfOpen,
}

/// The fields mutated together on every call outcome.
#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
}

// == Breaker Snapshot ==
/// Serializable view of a breaker for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub recovery_timeout_secs: f64,
}

// == Circuit Breaker ==
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    trips_on: Vec<ErrorKind>,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Creates a closed breaker that opens after `failure_threshold`
    /// (clamped to 1) consecutive counted failures and admits a trial call
    /// `recovery_timeout` after the last one.
    ///
    /// Only transient kinds are counted by default; see [`Self::trips_on`].
    pub fn new(name: impl Into<String>, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            trips_on: ErrorKind::TRANSIENT.to_vec(),
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Replaces the set of error kinds that count as failures.
    pub fn trips_on(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.trips_on = kinds.into_iter().collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state as the next caller would see it: an OPEN breaker whose
    /// recovery timeout has elapsed reports HALF_OPEN.
    pub fn state(&self) -> CircuitState {
        let s = self.lock();
        match s.state {
            CircuitState::Open if self.recovery_elapsed(&s) => CircuitState::HalfOpen,
            state => state,
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Forces the breaker back to CLOSED with no recorded failures.
    pub fn reset(&self) {
        let mut s = self.lock();
        s.state = CircuitState::Closed;
        s.failure_count = 0;
        s.last_failure = None;
        s.trial_in_flight = false;
        info!(breaker = %self.name, "Circuit breaker reset");
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            name: self.name.clone(),
            state: self.state(),
            failure_count: self.failure_count(),
            failure_threshold: self.failure_threshold,
            recovery_timeout_secs: self.recovery_timeout.as_secs_f64(),
        }
    }

    // == Call ==
    /// Runs `op` under breaker protection.
    ///
    /// While OPEN, or while another caller holds the HALF_OPEN trial, the call
    /// fails fast with [`CircuitOpen`] converted into `E` and `op` is not
    /// invoked. Errors outside the counted kinds pass through untouched.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + From<CircuitOpen> + Display,
    {
        let admission = match self.admit() {
            Ok(admission) => admission,
            Err(open) => {
                debug!(breaker = %self.name, "Rejected: {}", open);
                return Err(open.into());
            }
        };

        // Releases the trial slot if `op` is dropped mid-flight or ends
        // inconclusively
        let mut trial = TrialGuard {
            breaker: self,
            armed: admission == Admission::Trial,
        };

        let result = op().await;
        match &result {
            Ok(_) => {
                trial.armed = false;
                self.on_success(admission);
            }
            Err(err) if self.trips_on.contains(&err.kind()) => {
                trial.armed = false;
                self.on_failure(admission, err);
            }
            Err(_) => {}
        }
        result
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn recovery_elapsed(&self, s: &BreakerState) -> bool {
        s.last_failure
            .map_or(true, |at| at.elapsed() >= self.recovery_timeout)
    }

    /// Decides admission and performs the lazy OPEN -> HALF_OPEN transition
    /// in the same critical section, so one caller wins the trial.
    fn admit(&self) -> Result<Admission, CircuitOpen> {
        let mut s = self.lock();
        match s.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::Open => {
                let since = s.last_failure.map_or(self.recovery_timeout, |at| at.elapsed());
                if since >= self.recovery_timeout {
                    info!(breaker = %self.name, "Circuit breaker entering HALF_OPEN state");
                    s.state = CircuitState::HalfOpen;
                    s.trial_in_flight = true;
                    Ok(Admission::Trial)
                } else {
                    Err(CircuitOpen {
                        retry_after: self.recovery_timeout - since,
                    })
                }
            }
            CircuitState::HalfOpen if s.trial_in_flight => Err(CircuitOpen {
                retry_after: Duration::ZERO,
            }),
            CircuitState::HalfOpen => {
                s.trial_in_flight = true;
                Ok(Admission::Trial)
            }
        }
    }

    fn on_success(&self, admission: Admission) {
        let mut s = self.lock();
        match (admission, s.state) {
            (Admission::Trial, _) => {
                info!(breaker = %self.name, "Circuit breaker entering CLOSED state (service recovered)");
                s.state = CircuitState::Closed;
                s.failure_count = 0;
                s.last_failure = None;
                s.trial_in_flight = false;
            }
            (Admission::Normal, CircuitState::Closed) => {
                s.failure_count = 0;
                s.last_failure = None;
            }
            // Admitted before the breaker opened; the trial decides recovery
            (Admission::Normal, _) => {}
        }
    }

    fn on_failure(&self, admission: Admission, err: &impl Display) {
        let mut s = self.lock();
        match (admission, s.state) {
            (Admission::Trial, _) => {
                s.failure_count = s.failure_count.saturating_add(1);
                s.last_failure = Some(Instant::now());
                s.trial_in_flight = false;
                s.state = CircuitState::Open;
                error!(breaker = %self.name, "Trial call failed, circuit breaker re-entering OPEN state: {}", err);
            }
            (Admission::Normal, CircuitState::Closed) => {
                s.failure_count = s.failure_count.saturating_add(1);
                s.last_failure = Some(Instant::now());
                warn!(
                    breaker = %self.name,
                    "Circuit breaker failure {}/{}: {}",
                    s.failure_count,
                    self.failure_threshold,
                    err
                );
                if s.failure_count >= self.failure_threshold {
                    error!(
                        breaker = %self.name,
                        "Circuit breaker entering OPEN state after {} failures",
                        s.failure_count
                    );
                    s.state = CircuitState::Open;
                }
            }
            (Admission::Normal, _) => {}
        }
    }

    /// Returns an abandoned trial's slot: back to OPEN without refreshing the
    /// failure time, so the next caller becomes the new trial.
    fn abandon_trial(&self) {
        let mut s = self.lock();
        if s.state == CircuitState::HalfOpen && s.trial_in_flight {
            s.trial_in_flight = false;
            s.state = CircuitState::Open;
            debug!(breaker = %self.name, "Trial call ended without a verdict");
        }
    }
}

struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.abandon_trial();
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::error::UpstreamError;

    const RECOVERY: Duration = Duration::from_secs(60);

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new("test", threshold, RECOVERY)
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), UpstreamError> {
        breaker
            .call(|| async { Err(UpstreamError::Network("down".into())) })
            .await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<&'static str, UpstreamError> {
        breaker.call(|| async { Ok("ok") }).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_closed() {
        let breaker = breaker(3);

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(succeed(&breaker).await, Ok("ok"));
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_at_threshold_and_fails_fast() {
        let breaker = breaker(3);

        for _ in 0..3 {
            assert!(matches!(fail(&breaker).await, Err(UpstreamError::Network(_))));
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.failure_count(), 3);

        let calls = AtomicU32::new(0);
        let result = breaker
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, UpstreamError>(())
            })
            .await;

        assert!(matches!(result, Err(UpstreamError::ServiceUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let breaker = breaker(3);

        fail(&breaker).await.unwrap_err();
        fail(&breaker).await.unwrap_err();
        succeed(&breaker).await.unwrap();
        fail(&breaker).await.unwrap_err();
        fail(&breaker).await.unwrap_err();

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncounted_errors_pass_through() {
        let breaker = breaker(1);

        let result: Result<(), _> = breaker
            .call(|| async { Err(UpstreamError::InvalidInput("bad".into())) })
            .await;

        assert!(matches!(result, Err(UpstreamError::InvalidInput(_))));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_trip_kinds() {
        let breaker = breaker(1).trips_on([ErrorKind::InvalidInput]);

        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), CircuitState::Closed);

        let _: Result<(), _> = breaker
            .call(|| async { Err(UpstreamError::InvalidInput("bad".into())) })
            .await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_counts_down() {
        let breaker = breaker(1);
        fail(&breaker).await.unwrap_err();

        tokio::time::advance(Duration::from_secs(20)).await;

        let open = breaker.admit().unwrap_err();
        assert_eq!(open.retry_after, Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_timeout() {
        let breaker = breaker(2);
        fail(&breaker).await.unwrap_err();
        fail(&breaker).await.unwrap_err();

        tokio::time::advance(RECOVERY).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        assert_eq!(succeed(&breaker).await, Ok("ok"));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens() {
        let breaker = breaker(2);
        fail(&breaker).await.unwrap_err();
        fail(&breaker).await.unwrap_err();

        tokio::time::advance(RECOVERY).await;
        fail(&breaker).await.unwrap_err();

        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.failure_count(), 3);
        // Fresh recovery window
        assert!(matches!(
            succeed(&breaker).await,
            Err(UpstreamError::ServiceUnavailable(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_trial_per_recovery_window() {
        let breaker = breaker(1);
        fail(&breaker).await.unwrap_err();
        tokio::time::advance(RECOVERY).await;

        let second_calls = AtomicU32::new(0);
        let trial = breaker.call(|| async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, UpstreamError>("trial")
        });
        let concurrent = breaker.call(|| async {
            second_calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, UpstreamError>("concurrent")
        });

        let (trial, concurrent) = tokio::join!(trial, concurrent);

        assert_eq!(trial, Ok("trial"));
        assert!(matches!(concurrent, Err(UpstreamError::ServiceUnavailable(_))));
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inconclusive_trial_releases_slot() {
        let breaker = breaker(1);
        fail(&breaker).await.unwrap_err();
        tokio::time::advance(RECOVERY).await;

        let result: Result<(), _> = breaker
            .call(|| async { Err(UpstreamError::InvalidInput("bad".into())) })
            .await;
        assert!(matches!(result, Err(UpstreamError::InvalidInput(_))));

        // The next caller gets a trial right away
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(succeed(&breaker).await, Ok("ok"));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_trial_releases_slot() {
        let breaker = breaker(1);
        fail(&breaker).await.unwrap_err();
        tokio::time::advance(RECOVERY).await;

        let timed_out = tokio::time::timeout(
            Duration::from_millis(10),
            breaker.call(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, UpstreamError>(())
            }),
        )
        .await;
        assert!(timed_out.is_err());

        assert_eq!(succeed(&breaker).await, Ok("ok"));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_and_snapshot() {
        let breaker = breaker(1);
        fail(&breaker).await.unwrap_err();

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.name, "test");
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.failure_count, 1);
        assert_eq!(
            serde_json::to_value(&snapshot).unwrap()["state"],
            "OPEN"
        );

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }
}
