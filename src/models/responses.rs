//! Response DTOs for the observability API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::{CacheStats, CleanupReport};
use crate::resilience::{CircuitState, GuardSnapshot};

pub const SERVICE_NAME: &str = "arena-shield";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Response body for the health endpoints (GET /health, GET /health/live)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: timestamp(),
            version: Some(VERSION.to_string()),
        }
    }

    pub fn alive() -> Self {
        Self {
            status: "alive".to_string(),
            timestamp: timestamp(),
            version: None,
        }
    }
}

/// Disk cache occupancy.
#[derive(Debug, Clone, Serialize)]
pub struct PersistentMetrics {
    pub entries: usize,
    pub directory: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheMetrics {
    pub meta: CacheStats,
    pub deck: CacheStats,
    pub persistent: PersistentMetrics,
}

/// Response body for GET /metrics
#[derive(Debug, Clone, Serialize)]
pub struct MetricsResponse {
    pub timestamp: String,
    pub version: String,
    pub cache: CacheMetrics,
}

impl MetricsResponse {
    pub fn new(cache: CacheMetrics) -> Self {
        Self {
            timestamp: timestamp(),
            version: VERSION.to_string(),
            cache,
        }
    }
}

/// Cache occupancy as `"size/max_size entries"`.
#[derive(Debug, Clone, Serialize)]
pub struct CacheOccupancy {
    pub meta: String,
    pub deck: String,
    pub persistent: String,
}

impl CacheOccupancy {
    pub fn new(meta: &CacheStats, deck: &CacheStats, persistent_entries: usize) -> Self {
        Self {
            meta: format!("{}/{} entries", meta.size, meta.max_size),
            deck: format!("{}/{} entries", deck.size, deck.max_size),
            persistent: format!("{persistent_entries} entries"),
        }
    }
}

/// Response body for GET /status
///
/// `status` is "degraded" while any upstream breaker is not CLOSED.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub service: String,
    pub version: String,
    pub status: String,
    pub timestamp: String,
    pub caches: CacheOccupancy,
    pub upstreams: Vec<GuardSnapshot>,
}

impl StatusResponse {
    pub fn new(caches: CacheOccupancy, upstreams: Vec<GuardSnapshot>) -> Self {
        let degraded = upstreams.iter().any(|guard| {
            guard
                .circuit_breaker
                .as_ref()
                .is_some_and(|breaker| breaker.state != CircuitState::Closed)
        });
        Self {
            service: SERVICE_NAME.to_string(),
            version: VERSION.to_string(),
            status: if degraded { "degraded" } else { "operational" }.to_string(),
            timestamp: timestamp(),
            caches,
            upstreams,
        }
    }
}

/// Response body for POST /cache/cleanup
#[derive(Debug, Clone, Serialize)]
pub struct CleanupResponse {
    pub removed: CleanupReport,
    pub total: usize,
}

impl CleanupResponse {
    pub fn new(removed: CleanupReport) -> Self {
        Self {
            total: removed.total(),
            removed,
        }
    }
}

/// Response body for DELETE /cache/:name
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub message: String,
    pub cache: String,
    pub cleared: usize,
}

impl ClearResponse {
    pub fn new(cache: impl Into<String>, cleared: usize) -> Self {
        let cache = cache.into();
        Self {
            message: format!("Cache '{}' cleared", cache),
            cache,
            cleared,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::cache::CacheCounters;
    use crate::resilience::{CircuitBreaker, Guard};

    fn stats(size: usize, max_size: usize) -> CacheStats {
        CacheStats::new(CacheCounters::default(), size, max_size)
    }

    #[test]
    fn test_health_response_serialize() {
        let json = serde_json::to_value(HealthResponse::healthy()).unwrap();
        assert_eq!(json["status"], "healthy");
        assert!(json.get("timestamp").is_some());
        assert_eq!(json["version"], VERSION);

        let json = serde_json::to_value(HealthResponse::alive()).unwrap();
        assert_eq!(json["status"], "alive");
        assert!(json.get("version").is_none());
    }

    #[test]
    fn test_cache_occupancy_format() {
        let occupancy = CacheOccupancy::new(&stats(3, 100), &stats(0, 500), 12);

        assert_eq!(occupancy.meta, "3/100 entries");
        assert_eq!(occupancy.deck, "0/500 entries");
        assert_eq!(occupancy.persistent, "12 entries");
    }

    #[tokio::test]
    async fn test_status_degraded_when_breaker_open() {
        let breaker = CircuitBreaker::new("ai", 1, Duration::from_secs(60));
        let guard = Guard::new("ai").with_circuit_breaker(breaker);
        let occupancy = CacheOccupancy::new(&stats(0, 1), &stats(0, 1), 0);

        let healthy = StatusResponse::new(occupancy.clone(), vec![guard.snapshot()]);
        assert_eq!(healthy.status, "operational");

        let _: Result<(), _> = guard
            .call(|| async { Err(crate::error::UpstreamError::Network("down".into())) })
            .await;
        let degraded = StatusResponse::new(occupancy, vec![guard.snapshot()]);
        assert_eq!(degraded.status, "degraded");
    }

    #[test]
    fn test_cleanup_response_total() {
        let resp = CleanupResponse::new(CleanupReport {
            meta: 1,
            deck: 2,
            persistent: 3,
        });
        assert_eq!(resp.total, 6);
    }

    #[test]
    fn test_clear_response_serialize() {
        let json = serde_json::to_string(&ClearResponse::new("deck", 4)).unwrap();
        assert!(json.contains("deck"));
        assert!(json.contains("cleared"));
    }
}
