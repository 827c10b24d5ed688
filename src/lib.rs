//! # bulkhead
//!
//! Resource-bounded building blocks for async services: a bounded LRU+TTL
//! cache, a FIFO-fair counting semaphore, a retrying batch processor, and a
//! fixed-window rate limiter. The components compose: the batch processor
//! bounds its concurrency with the semaphore, and the rate limiter stores
//! its per-key state in the bounded cache.
//!
//! Shared principles across the crate:
//! - every resource is bounded up front, and invalid bounds are rejected at
//!   construction rather than clamped
//! - expected outcomes (cache misses, denied requests, per-item failures)
//!   are data; errors are reserved for misuse and broken configuration
//! - background work (cleanup timers, batch jobs) is owned by a handle and
//!   stops when that owner says so or goes away
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use bulkhead::{BoundedCache, CacheConfig};
//!
//! # async fn demo() -> bulkhead::Result<()> {
//! let config = CacheConfig::new(1000).with_default_ttl(Duration::from_secs(300));
//! let cache: BoundedCache<String, String> = BoundedCache::new(config)?;
//!
//! cache.set("session:42".into(), "alice".into(), None).await;
//! assert_eq!(cache.get(&"session:42".into()).await.as_deref(), Some("alice"));
//!
//! let cleanup = cache.start_periodic_cleanup(Duration::from_secs(30));
//! // ...
//! cleanup.stop();
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod limiter;
pub mod semaphore;
pub mod tasks;

// Re-export the types most callers need
pub use batch::{
    Attempt, AttemptOutcome, BatchJob, BatchProcessor, BatchReport, CancelFlag, ItemOutcome,
    ItemReport, ProgressSnapshot,
};
pub use cache::{BoundedCache, CacheStats};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BatchConfig, CacheConfig, RateLimiterConfig};
pub use error::{Error, Result};
pub use limiter::{Decision, RateLimitRecord, RateLimiter};
pub use semaphore::{OwnedSemaphorePermit, Semaphore, SemaphorePermit};
pub use tasks::CleanupHandle;
