//! API Handlers
//!
//! HTTP handlers for the health, metrics and cache maintenance endpoints.

use std::io;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::cache::Caches;
use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::models::{
    CacheMetrics, CacheOccupancy, CleanupResponse, ClearResponse, HealthResponse,
    MetricsResponse, PersistentMetrics, StatusResponse,
};
use crate::resilience::{CircuitBreaker, Guard, RateLimiter, RetryPolicy};

/// Application state shared across all handlers.
///
/// Owns the caches and one [`Guard`] per upstream service. Every field is a
/// cheap handle, so the state is cloned into each request.
#[derive(Debug, Clone)]
pub struct AppState {
    pub caches: Caches,
    /// AI completion provider
    pub ai: Guard,
    /// Card-price lookups
    pub prices: Guard,
}

impl AppState {
    pub fn new(caches: Caches, ai: Guard, prices: Guard) -> Self {
        Self { caches, ai, prices }
    }

    /// Builds the caches and upstream guards from configuration.
    pub fn from_config(config: &Config) -> io::Result<Self> {
        Ok(Self::new(
            Caches::from_config(config)?,
            upstream_guard("ai", config, config.ai_rate_limit, config.ai_rate_burst),
            upstream_guard(
                "prices",
                config,
                config.price_rate_limit,
                config.price_rate_burst,
            ),
        ))
    }

    pub fn guards(&self) -> [&Guard; 2] {
        [&self.ai, &self.prices]
    }
}

fn upstream_guard(name: &str, config: &Config, rate: f64, burst: u32) -> Guard {
    let retry = RetryPolicy::new()
        .with_max_attempts(config.retry_max_attempts)
        .with_base_delay(Duration::from_millis(config.retry_base_delay_ms))
        .with_max_delay(Duration::from_millis(config.retry_max_delay_ms));

    Guard::new(name)
        .with_rate_limiter(RateLimiter::new(name, rate, burst))
        .with_circuit_breaker(CircuitBreaker::new(
            name,
            config.breaker_failure_threshold,
            config.breaker_recovery_timeout(),
        ))
        .with_retry(retry)
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// Handler for GET /health/live
pub async fn liveness_handler() -> Json<HealthResponse> {
    Json(HealthResponse::alive())
}

/// Handler for GET /metrics
///
/// Per-cache statistics for monitoring.
pub async fn metrics_handler(State(state): State<AppState>) -> Json<MetricsResponse> {
    let caches = &state.caches;
    let cache = CacheMetrics {
        meta: caches.meta.stats().await,
        deck: caches.deck.stats().await,
        persistent: PersistentMetrics {
            entries: caches.persistent.len().await,
            directory: caches.persistent.dir().display().to_string(),
        },
    };

    Json(MetricsResponse::new(cache))
}

/// Handler for GET /status
///
/// Service summary: cache occupancy plus breaker and limiter state of every
/// upstream.
pub async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let caches = &state.caches;
    let occupancy = CacheOccupancy::new(
        &caches.meta.stats().await,
        &caches.deck.stats().await,
        caches.persistent.len().await,
    );

    let upstreams = state.guards().into_iter().map(Guard::snapshot).collect();

    Json(StatusResponse::new(occupancy, upstreams))
}

/// Handler for POST /cache/cleanup
///
/// Runs an expiry sweep immediately instead of waiting for the background task.
pub async fn cleanup_handler(State(state): State<AppState>) -> Json<CleanupResponse> {
    Json(CleanupResponse::new(state.caches.cleanup_expired().await))
}

/// Handler for DELETE /cache/:name
///
/// Clears `meta`, `deck` or `persistent`.
pub async fn clear_cache_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ClearResponse>> {
    match state.caches.clear(&name).await {
        Some(cleared) => Ok(Json(ClearResponse::new(name, cleared))),
        None => Err(ApiError::NotFound(format!("Unknown cache '{}'", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tempfile::TempDir;

    fn test_state(dir: &TempDir) -> AppState {
        let config = Config {
            persistent_cache_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        AppState::from_config(&config).unwrap()
    }

    #[test]
    fn test_state_from_config() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        assert_eq!(state.ai.name(), "ai");
        assert_eq!(state.prices.rate_limiter().map(RateLimiter::burst), Some(10));
        assert!(state.ai.circuit_breaker().is_some());
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }

    #[tokio::test]
    async fn test_metrics_handler() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        state.caches.meta.set("standard", json!({}), None).await;
        state.caches.meta.get("standard").await;
        state.caches.meta.get("historic").await;

        let response = metrics_handler(State(state)).await;

        assert_eq!(response.cache.meta.size, 1);
        assert_eq!(response.cache.meta.max_size, 100);
        assert_eq!(response.cache.meta.hits, 1);
        assert_eq!(response.cache.meta.misses, 1);
        assert_eq!(response.cache.deck.max_size, 500);
        assert_eq!(response.cache.persistent.entries, 0);
    }

    #[tokio::test]
    async fn test_status_handler() {
        let dir = TempDir::new().unwrap();
        let response = status_handler(State(test_state(&dir))).await;

        assert_eq!(response.status, "operational");
        assert_eq!(response.caches.deck, "0/500 entries");
        assert_eq!(response.upstreams.len(), 2);
    }

    #[tokio::test]
    async fn test_clear_cache_handler() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        state.caches.deck.set("abc", json!(1), None).await;

        let response = clear_cache_handler(State(state.clone()), Path("deck".to_string()))
            .await
            .unwrap();
        assert_eq!(response.cleared, 1);

        let result = clear_cache_handler(State(state), Path("unknown".to_string())).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }
}
