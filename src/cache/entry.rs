//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::{Duration, Instant};

// == Cache Entry ==
/// A single cache entry with its value and bookkeeping metadata.
///
/// Entries are exclusively owned by the cache's internal map: created on
/// `set`, touched on `get`/`set`, and destroyed on evict, expire, or delete.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// When the entry was (last) inserted
    pub inserted_at: Instant,
    /// When the entry was last read or written
    pub last_accessed_at: Instant,
    /// Expiration instant; `None` means the entry never expires
    pub expires_at: Option<Instant>,
    /// Slot index in the recency list
    pub(crate) node: usize,
    /// Tie-breaker under the entry's key in the expiry index
    pub(crate) expiry_seq: Option<u64>,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    pub(crate) fn new(
        value: V,
        now: Instant,
        expires_at: Option<Instant>,
        node: usize,
        expiry_seq: Option<u64>,
    ) -> Self {
        Self {
            value,
            inserted_at: now,
            last_accessed_at: now,
            expires_at,
            node,
            expiry_seq,
        }
    }

    // == Is Expired ==
    /// Checks whether the entry has expired as of `now`.
    ///
    /// Boundary condition: an entry is expired when `now` is greater than or
    /// equal to its expiration instant, so an entry whose TTL has fully
    /// elapsed is never returned as a hit.
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns the remaining TTL as of `now`, or `None` if the entry never
    /// expires. An expired entry reports `Some(Duration::ZERO)`.
    pub fn ttl_remaining(&self, now: Instant) -> Option<Duration> {
        self.expires_at
            .map(|expires| expires.saturating_duration_since(now))
    }
}
