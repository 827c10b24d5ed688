//! Bounded Cache Handle
//!
//! Clonable async wrapper around the synchronous [`CacheStore`]. All
//! structural mutation (get with its recency touch, set, delete, update,
//! sweep) serializes on a single `tokio::sync::RwLock` write lock, which is
//! the crate's answer to parallel access: the cache is safe to share across
//! threads, and the lock is the only synchronization.

use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::cache::{CacheStats, CacheStore};
use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::error::Result;
use crate::tasks::{CleanupHandle, CleanupSlot};

struct Shared<K, V> {
    store: RwLock<CacheStore<K, V>>,
    clock: Arc<dyn Clock>,
    sweeper: Arc<CleanupSlot>,
}

// == Bounded Cache ==
/// Shared handle to a bounded LRU+TTL cache.
///
/// Cloning is cheap and every clone addresses the same underlying store.
pub struct BoundedCache<K, V> {
    inner: Arc<Shared<K, V>>,
}

impl<K, V> Clone for BoundedCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> std::fmt::Debug for BoundedCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedCache").finish_non_exhaustive()
    }
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    // == Constructors ==
    /// Creates a cache driven by the system clock.
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a cache driven by the given clock.
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let store = CacheStore::new(config)?;
        Ok(Self {
            inner: Arc::new(Shared {
                store: RwLock::new(store),
                clock,
                sweeper: Arc::new(CleanupSlot::default()),
            }),
        })
    }

    // == Get ==
    /// Retrieves a value by key; a miss returns `None`.
    pub async fn get(&self, key: &K) -> Option<V> {
        let now = self.inner.clock.now();
        self.inner.store.write().await.get(key, now)
    }

    // == Set ==
    /// Stores a key-value pair with an optional TTL (falls back to the
    /// configured default TTL when `None`).
    pub async fn set(&self, key: K, value: V, ttl: Option<Duration>) {
        let now = self.inner.clock.now();
        self.inner.store.write().await.set(key, value, ttl, now);
    }

    // == Update ==
    /// Atomic read-modify-write under a single lock acquisition.
    ///
    /// `f` receives the current unexpired value (or `None`) and returns the
    /// value to store; the new value is returned to the caller.
    pub async fn update<F>(&self, key: K, ttl: Option<Duration>, f: F) -> V
    where
        F: FnOnce(Option<V>) -> V,
    {
        let now = self.inner.clock.now();
        self.inner.store.write().await.update(key, ttl, f, now)
    }

    // == Delete ==
    /// Removes an entry; idempotent. Returns whether an entry was removed.
    pub async fn delete(&self, key: &K) -> bool {
        self.inner.store.write().await.delete(key)
    }

    // == Size ==
    /// Returns the current number of entries.
    pub async fn len(&self) -> usize {
        self.inner.store.read().await.len()
    }

    /// Returns true if the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.store.read().await.is_empty()
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub async fn stats(&self) -> CacheStats {
        self.inner.store.read().await.stats()
    }

    // == Sweep ==
    /// Removes all expired entries now; returns the number removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = self.inner.clock.now();
        self.inner.store.write().await.sweep_expired(now)
    }

    // == Periodic Cleanup ==
    /// Starts the background sweep that removes expired entries every
    /// `interval`. A previously started sweep is replaced.
    ///
    /// The returned [`CleanupHandle`] must be stopped on disposal; as a
    /// backstop, the task also exits on its own once every handle to the
    /// cache has been dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_periodic_cleanup(&self, interval: Duration) -> CleanupHandle {
        let weak: Weak<Shared<K, V>> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            info!(interval_ms = interval.as_millis() as u64, "cache cleanup task started");
            loop {
                tokio::time::sleep(interval).await;
                let Some(shared) = weak.upgrade() else { break };
                let now = shared.clock.now();
                let removed = shared.store.write().await.sweep_expired(now);
                if removed > 0 {
                    info!(removed, "removed expired cache entries");
                } else {
                    debug!("no expired cache entries found");
                }
            }
            debug!("cache cleanup task exiting");
        });
        self.inner.sweeper.replace(handle);
        CleanupHandle::new(Arc::clone(&self.inner.sweeper))
    }

    /// Stops the background sweep if one is running. Safe to call
    /// repeatedly, including when cleanup was never started.
    pub fn stop_periodic_cleanup(&self) {
        self.inner.sweeper.stop();
    }

    /// Clock shared by every handle to this cache.
    pub(crate) fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.inner.clock)
    }
}
