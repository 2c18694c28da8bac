//! Arena Shield - resilience and caching layer for calls to external services
//!
//! In-memory LRU+TTL caches, a crash-safe persistent cache, retry with
//! backoff, circuit breaking and token-bucket rate limiting, plus a small
//! observability API over their state.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod resilience;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use error::{Classify, ErrorKind, UpstreamError};
pub use resilience::Guard;
pub use tasks::spawn_cleanup_task;
