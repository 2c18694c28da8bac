//! API Routes
//!
//! Configures the Axum router with the observability endpoints.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    cleanup_handler, clear_cache_handler, health_handler, liveness_handler, metrics_handler,
    status_handler, AppState,
};

/// Creates the router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Health check
/// - `GET /health/live` - Liveness probe
/// - `GET /metrics` - Per-cache statistics
/// - `GET /status` - Cache occupancy and upstream breaker/limiter state
/// - `POST /cache/cleanup` - Sweep expired entries now
/// - `DELETE /cache/:name` - Clear one cache
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/metrics", get(metrics_handler))
        .route("/status", get(status_handler))
        .route("/cache/cleanup", post(cleanup_handler))
        .route("/cache/:name", delete(clear_cache_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
