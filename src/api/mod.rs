//! API Module
//!
//! Observability and cache maintenance endpoints. The service's resilience
//! state is reported here; nothing in this layer caches or retries.
//!
//! # Endpoints
//! - `GET /health`, `GET /health/live`
//! - `GET /metrics`
//! - `GET /status`
//! - `POST /cache/cleanup`
//! - `DELETE /cache/:name`

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
