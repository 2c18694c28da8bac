//! Resilience Module
//!
//! Retry with backoff, circuit breaking and token-bucket rate limiting for
//! calls to external services, composed per upstream by [`Guard`].

mod circuit_breaker;
mod guard;
mod rate_limiter;
mod retry;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitState};
pub use guard::{Guard, GuardSnapshot};
pub use rate_limiter::{LimiterSnapshot, RateLimiter};
pub use retry::RetryPolicy;
