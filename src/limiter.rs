//! Rate Limiter Module
//!
//! Fixed-window per-key rate limiting plus explicit blocking, backed by a
//! [`BoundedCache`] so per-key state is itself memory-bounded: a key whose
//! record is evicted simply starts a fresh window on its next request.
//!
//! The check-then-increment step for a key runs inside a single atomic
//! cache update, so two concurrent checks can never both claim the last
//! slot of a window.

use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::cache::BoundedCache;
use crate::clock::Clock;
use crate::config::RateLimiterConfig;
use crate::error::Result;
use crate::tasks::CleanupHandle;

// == Rate Limit Record ==
/// Per-key limiter state stored in the backing cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRecord {
    /// Start of the current fixed window
    pub window_start: Instant,
    /// Requests counted against the current window
    pub count: u32,
    /// If set and in the future, every request for the key is denied
    pub blocked_until: Option<Instant>,
}

impl RateLimitRecord {
    fn fresh(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
            blocked_until: None,
        }
    }
}

// == Decision ==
/// Outcome of a rate limit check. A denial is an ordinary result, not an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// On denial, how long until a request could be allowed again
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<Duration>,
}

impl Decision {
    fn allow() -> Self {
        Self {
            allowed: true,
            retry_after: None,
        }
    }

    fn deny(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            retry_after: Some(retry_after),
        }
    }
}

// == Rate Limiter ==
/// Fixed-window rate limiter over arbitrary keys.
///
/// Cloning is cheap; clones share the same backing cache and therefore the
/// same per-key state.
#[derive(Debug, Clone)]
pub struct RateLimiter<K> {
    cache: BoundedCache<K, RateLimitRecord>,
    window: Duration,
    limit: u32,
    clock: Arc<dyn Clock>,
}

impl<K> RateLimiter<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a limiter over the given backing cache. The limiter reads
    /// time from the cache's clock, so both always agree on "now".
    pub fn new(config: RateLimiterConfig, cache: BoundedCache<K, RateLimitRecord>) -> Result<Self> {
        config.validate()?;
        let clock = cache.clock();
        Ok(Self {
            cache,
            window: config.window,
            limit: config.limit,
            clock,
        })
    }

    // == Check ==
    /// Records one request against `key` and decides whether it may proceed.
    ///
    /// Precedence: an active block denies first; then an elapsed window is
    /// reset; then the count is compared against the limit. A denied request
    /// does not consume a slot. The whole step is one atomic cache update.
    pub async fn check(&self, key: &K) -> Decision {
        let now = self.clock.now();
        let window = self.window;
        let limit = self.limit;
        let mut decision = Decision::allow();

        self.cache
            .update(key.clone(), None, |current| {
                let mut record = current.unwrap_or_else(|| RateLimitRecord::fresh(now));

                match record.blocked_until {
                    Some(until) if now < until => {
                        decision = Decision::deny(until - now);
                        return record;
                    }
                    Some(_) => record.blocked_until = None,
                    None => {}
                }

                if now.saturating_duration_since(record.window_start) >= window {
                    record.window_start = now;
                    record.count = 0;
                }

                if record.count >= limit {
                    let window_end = record.window_start + window;
                    decision = Decision::deny(window_end.saturating_duration_since(now));
                } else {
                    record.count += 1;
                }
                record
            })
            .await;

        if !decision.allowed {
            debug!(retry_after_ms = ?decision.retry_after.map(|d| d.as_millis()), "request denied");
        }
        decision
    }

    // == Block ==
    /// Denies every request for `key` for the given duration, regardless of
    /// its window count. Returns the instant the block expires. Blocking an
    /// already blocked key replaces the previous deadline.
    pub async fn block(&self, key: &K, duration: Duration) -> Instant {
        let now = self.clock.now();
        let until = now + duration;

        self.cache
            .update(key.clone(), None, |current| {
                let mut record = current.unwrap_or_else(|| RateLimitRecord::fresh(now));
                record.blocked_until = Some(until);
                record
            })
            .await;

        debug!(block_ms = duration.as_millis() as u64, "key blocked");
        until
    }

    /// Returns true while an explicit block on `key` is active.
    pub async fn is_blocked(&self, key: &K) -> bool {
        let now = self.clock.now();
        match self.cache.get(key).await {
            Some(record) => matches!(record.blocked_until, Some(until) if now < until),
            None => false,
        }
    }

    /// Clears any explicit block on `key`; the window count is kept.
    pub async fn unblock(&self, key: &K) {
        let now = self.clock.now();
        self.cache
            .update(key.clone(), None, |current| {
                let mut record = current.unwrap_or_else(|| RateLimitRecord::fresh(now));
                record.blocked_until = None;
                record
            })
            .await;
    }

    // == Maintenance ==
    /// Starts the backing cache's periodic sweep of expired records.
    pub fn start_periodic_cleanup(&self, interval: Duration) -> CleanupHandle {
        self.cache.start_periodic_cleanup(interval)
    }

    /// Stops the backing cache's periodic sweep.
    pub fn stop_periodic_cleanup(&self) {
        self.cache.stop_periodic_cleanup();
    }

    /// Number of keys currently tracked.
    pub async fn tracked_keys(&self) -> usize {
        self.cache.len().await
    }
}
