//! Error types
//!
//! Failure classification shared by the resilience primitives, the concrete
//! upstream error used for external calls, and the HTTP error type.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

// == Error Kind ==
/// Failure class of an error raised by a guarded operation.
///
/// Retry and circuit-breaking decisions are made on the kind alone, never on
/// the concrete error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Upstream answered with a rate-limit response
    RateLimited,
    /// Connection-level failure
    Network,
    /// The call did not complete in time
    Timeout,
    /// Upstream reported itself unavailable (or a local breaker is open)
    ServiceUnavailable,
    /// Malformed input; retrying cannot help
    InvalidInput,
    /// Logic error or anything unclassified
    Internal,
}

impl ErrorKind {
    /// The transient kinds: retried by default and counted by the default breaker.
    pub const TRANSIENT: [ErrorKind; 4] = [
        ErrorKind::RateLimited,
        ErrorKind::Network,
        ErrorKind::Timeout,
        ErrorKind::ServiceUnavailable,
    ];

    pub fn is_transient(self) -> bool {
        Self::TRANSIENT.contains(&self)
    }
}

// == Classify ==
/// Maps an error onto its [`ErrorKind`].
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

// == Circuit Open ==
/// Fail-fast rejection raised while a circuit breaker is open.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Circuit breaker is OPEN, service unavailable; retry after {retry_after:?}")]
pub struct CircuitOpen {
    /// Time left until the breaker admits a trial call
    pub retry_after: Duration,
}

impl Classify for CircuitOpen {
    fn kind(&self) -> ErrorKind {
        ErrorKind::ServiceUnavailable
    }
}

// == Upstream Error ==
/// Error raised by calls to external services (AI providers, price lookups).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Classify for UpstreamError {
    fn kind(&self) -> ErrorKind {
        match self {
            UpstreamError::RateLimited(_) => ErrorKind::RateLimited,
            UpstreamError::Network(_) => ErrorKind::Network,
            UpstreamError::Timeout(_) => ErrorKind::Timeout,
            UpstreamError::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            UpstreamError::InvalidInput(_) => ErrorKind::InvalidInput,
            UpstreamError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<CircuitOpen> for UpstreamError {
    fn from(err: CircuitOpen) -> Self {
        UpstreamError::ServiceUnavailable(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for UpstreamError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        UpstreamError::Timeout(err.to_string())
    }
}

// == API Error ==
/// Error type for the observability HTTP surface.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Unknown resource (e.g. cache name)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

/// Convenience Result type for HTTP handlers.
pub type Result<T> = std::result::Result<T, ApiError>;
