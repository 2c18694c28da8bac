//! Cache Module
//!
//! In-memory LRU caching with TTL expiration, a disk-backed persistent cache,
//! key derivation for memoized calls, and the named caches the service owns.

mod caches;
pub mod entry;
mod key;
mod lru;
mod memory;
mod persistent;
mod stats;
mod store;


// Re-export public types
pub use caches::{Caches, CleanupReport};
pub use entry::CacheEntry;
pub use key::{cached, CacheKey};
pub use lru::LruTracker;
pub use memory::LruCache;
pub use persistent::PersistentCache;
pub use stats::{CacheCounters, CacheStats};
pub use store::LruStore;
