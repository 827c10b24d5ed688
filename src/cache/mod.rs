//! Cache Module
//!
//! Bounded in-memory caching with TTL expiration and O(1) LRU eviction.
//!
//! [`CacheStore`] is the synchronous core; [`BoundedCache`] is the shared
//! async handle most callers want.

mod bounded;
mod entry;
mod lru;
mod stats;
mod store;


// Re-export public types
pub use bounded::BoundedCache;
pub use entry::CacheEntry;
pub use lru::RecencyList;
pub use stats::CacheStats;
pub use store::CacheStore;
