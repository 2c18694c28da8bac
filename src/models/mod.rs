//! Response models for the observability API
//!
//! DTOs serialized into HTTP response bodies.

pub mod responses;

// Re-export commonly used types
pub use responses::{
    CacheMetrics, CacheOccupancy, CleanupResponse, ClearResponse, HealthResponse,
    MetricsResponse, PersistentMetrics, StatusResponse,
};
