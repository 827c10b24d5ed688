//! Cache Store Module
//!
//! Synchronous cache engine combining HashMap storage with O(1) LRU tracking
//! and an ordered expiry index for O(k) TTL sweeps.
//!
//! The store is the single-threaded core: every method takes `&mut self` and
//! an explicit `now` instant supplied by the caller. The shared async wrapper
//! in [`bounded`](super::BoundedCache) serializes access and injects the
//! clock.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::time::{Duration, Instant};

use crate::cache::{CacheEntry, CacheStats, RecencyList};
use crate::config::CacheConfig;
use crate::error::Result;

// == Cache Store ==
/// Bounded key-value store with LRU eviction and TTL expiration.
///
/// Invariants maintained across every operation:
/// - live entries never exceed `max_entries`
/// - the recency list holds exactly one node per live entry
/// - the expiry index holds exactly one record per live entry with a TTL
#[derive(Debug)]
pub struct CacheStore<K, V> {
    /// Key-value storage
    entries: HashMap<K, CacheEntry<V>>,
    /// LRU access tracker
    recency: RecencyList<K>,
    /// Entries ordered by expiration instant; the u64 breaks ties
    expiry: BTreeMap<(Instant, u64), K>,
    /// Next expiry tie-breaker
    next_seq: u64,
    /// Performance statistics
    stats: CacheStats,
    /// Maximum number of entries allowed
    max_entries: usize,
    /// TTL applied when `set` receives no explicit TTL
    default_ttl: Option<Duration>,
}

impl<K, V> CacheStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    // == Constructor ==
    /// Creates a new store from a validated configuration.
    ///
    /// Fails with `InvalidConfig` for a zero capacity or a zero default TTL;
    /// a cache that can hold nothing is a construction error, not a runtime
    /// eviction case.
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            entries: HashMap::new(),
            recency: RecencyList::new(),
            expiry: BTreeMap::new(),
            next_seq: 0,
            stats: CacheStats::new(),
            max_entries: config.max_entries,
            default_ttl: config.default_ttl,
        })
    }

    // == Set ==
    /// Stores a key-value pair with an optional TTL.
    ///
    /// If the key already exists, the value is overwritten, the TTL is reset,
    /// and the entry becomes most recently used. If the cache is at capacity,
    /// exactly one least recently used entry is evicted first.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `value` - The value to store
    /// * `ttl` - Optional TTL (falls back to the configured default)
    /// * `now` - Current instant from the owning clock
    pub fn set(&mut self, key: K, value: V, ttl: Option<Duration>, now: Instant) {
        let overwrite = self.detach(&key).is_some();

        if !overwrite && self.entries.len() >= self.max_entries {
            if let Some(victim) = self.recency.pop_oldest() {
                if let Some(evicted) = self.entries.remove(&victim) {
                    if let (Some(at), Some(seq)) = (evicted.expires_at, evicted.expiry_seq) {
                        self.expiry.remove(&(at, seq));
                    }
                }
                self.stats.record_eviction();
            }
        }

        let expires_at = ttl.or(self.default_ttl).map(|d| now + d);
        let expiry_seq = expires_at.map(|at| {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.expiry.insert((at, seq), key.clone());
            seq
        });
        let node = self.recency.insert(key.clone());

        self.entries
            .insert(key, CacheEntry::new(value, now, expires_at, node, expiry_seq));
        self.stats.set_total_entries(self.entries.len());
    }

    // == Get ==
    /// Retrieves a value by key, marking it most recently used on a hit.
    ///
    /// A miss (absent or expired) is a normal outcome, not an error. An
    /// expired entry is removed on the spot and never returned as a hit.
    pub fn get(&mut self, key: &K, now: Instant) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                self.stats.record_miss();
                return None;
            }
        };

        if expired {
            self.detach(key);
            self.stats.record_expiration();
            self.stats.record_miss();
            self.stats.set_total_entries(self.entries.len());
            return None;
        }

        let entry = self.entries.get_mut(key)?;
        entry.last_accessed_at = now;
        let node = entry.node;
        let value = entry.value.clone();
        self.recency.touch(node);
        self.stats.record_hit();
        Some(value)
    }

    // == Update ==
    /// Atomic read-modify-write: applies `f` to the current unexpired value
    /// (or `None`) and stores the result under the same key.
    ///
    /// Runs as a single step with respect to the store, so two concurrent
    /// callers serialized by the outer lock can never both observe the
    /// pre-update value. This is what makes check-then-increment patterns
    /// safe for the rate limiter.
    pub fn update<F>(&mut self, key: K, ttl: Option<Duration>, f: F, now: Instant) -> V
    where
        F: FnOnce(Option<V>) -> V,
    {
        let current = match self.entries.get(&key) {
            Some(entry) if entry.is_expired(now) => {
                self.detach(&key);
                self.stats.record_expiration();
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        };
        let next = f(current);
        self.set(key, next.clone(), ttl, now);
        next
    }

    // == Delete ==
    /// Removes an entry by key. Idempotent: deleting an absent key is a
    /// no-op that returns `false`.
    pub fn delete(&mut self, key: &K) -> bool {
        let removed = self.detach(key).is_some();
        if removed {
            self.stats.set_total_entries(self.entries.len());
        }
        removed
    }

    // == Sweep Expired ==
    /// Removes every entry whose TTL has elapsed as of `now`.
    ///
    /// Walks the expiry index from the earliest deadline and stops at the
    /// first live one, so the sweep touches expired entries only.
    ///
    /// Returns the number of entries removed.
    pub fn sweep_expired(&mut self, now: Instant) -> usize {
        let mut removed = 0;
        loop {
            match self.expiry.first_key_value() {
                Some((&(at, _), _)) if at <= now => {}
                _ => break,
            }
            if let Some((_, key)) = self.expiry.pop_first() {
                if let Some(entry) = self.entries.remove(&key) {
                    self.recency.remove(entry.node);
                    self.stats.record_expiration();
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            self.stats.set_total_entries(self.entries.len());
        }
        removed
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    // == Length ==
    /// Returns the current number of entries in the cache.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes an entry and its recency node and expiry record.
    fn detach(&mut self, key: &K) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(entry.node);
        if let (Some(at), Some(seq)) = (entry.expires_at, entry.expiry_seq) {
            self.expiry.remove(&(at, seq));
        }
        Some(entry)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn store(max_entries: usize) -> CacheStore<String, String> {
        CacheStore::new(CacheConfig::new(max_entries)).unwrap()
    }

    fn key(s: &str) -> String {
        s.to_string()
    }

    #[test]
    fn test_store_new() {
        let s = store(100);
        assert_eq!(s.len(), 0);
        assert!(s.is_empty());
    }

    #[test]
    fn test_store_zero_capacity_rejected() {
        let result: Result<CacheStore<String, String>> = CacheStore::new(CacheConfig::new(0));
        assert!(matches!(
            result,
            Err(crate::error::Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_store_set_and_get() {
        let mut s = store(100);
        let now = Instant::now();

        s.set(key("key1"), key("value1"), None, now);

        assert_eq!(s.get(&key("key1"), now), Some(key("value1")));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_store_get_nonexistent_is_miss() {
        let mut s = store(100);
        let now = Instant::now();

        assert_eq!(s.get(&key("nonexistent"), now), None);
        assert_eq!(s.stats().misses, 1);
    }

    #[test]
    fn test_store_delete_idempotent() {
        let mut s = store(100);
        let now = Instant::now();

        s.set(key("key1"), key("value1"), None, now);

        assert!(s.delete(&key("key1")));
        assert!(!s.delete(&key("key1")));
        assert!(s.is_empty());
    }

    #[test]
    fn test_store_overwrite() {
        let mut s = store(100);
        let now = Instant::now();

        s.set(key("key1"), key("value1"), None, now);
        s.set(key("key1"), key("value2"), None, now);

        assert_eq!(s.get(&key("key1"), now), Some(key("value2")));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_store_ttl_expiration() {
        let mut s = store(100);
        let now = Instant::now();

        s.set(key("key1"), key("value1"), Some(Duration::from_millis(100)), now);

        assert!(s.get(&key("key1"), now).is_some());
        // Simulated t=150ms: past the 100ms TTL
        let later = now + Duration::from_millis(150);
        assert_eq!(s.get(&key("key1"), later), None);
        assert_eq!(s.stats().expirations, 1);
        assert_eq!(s.len(), 0);
    }

    #[test]
    fn test_store_lru_eviction() {
        let mut s = store(3);
        let now = Instant::now();

        s.set(key("key1"), key("v1"), None, now);
        s.set(key("key2"), key("v2"), None, now);
        s.set(key("key3"), key("v3"), None, now);

        // Cache is full; adding key4 evicts key1 (oldest)
        s.set(key("key4"), key("v4"), None, now);

        assert_eq!(s.len(), 3);
        assert_eq!(s.get(&key("key1"), now), None);
        assert!(s.get(&key("key2"), now).is_some());
        assert!(s.get(&key("key3"), now).is_some());
        assert!(s.get(&key("key4"), now).is_some());
        assert_eq!(s.stats().evictions, 1);
    }

    #[test]
    fn test_store_lru_touch_on_get() {
        let mut s = store(3);
        let now = Instant::now();

        s.set(key("a"), key("1"), None, now);
        s.set(key("b"), key("2"), None, now);
        s.set(key("c"), key("3"), None, now);

        // Access 'a' to make it most recently used
        s.get(&key("a"), now);

        // Adding 'd' evicts 'b' (now oldest)
        s.set(key("d"), key("4"), None, now);

        assert!(s.get(&key("a"), now).is_some());
        assert_eq!(s.get(&key("b"), now), None);
    }

    #[test]
    fn test_store_overwrite_refreshes_recency() {
        let mut s = store(2);
        let now = Instant::now();

        s.set(key("a"), key("1"), None, now);
        s.set(key("b"), key("2"), None, now);
        // Overwriting 'a' makes it most recent; 'b' becomes the victim
        s.set(key("a"), key("1b"), None, now);
        s.set(key("c"), key("3"), None, now);

        assert!(s.get(&key("a"), now).is_some());
        assert_eq!(s.get(&key("b"), now), None);
    }

    #[test]
    fn test_store_sweep_expired() {
        let mut s = store(100);
        let now = Instant::now();

        s.set(key("short"), key("v"), Some(Duration::from_millis(100)), now);
        s.set(key("long"), key("v"), Some(Duration::from_secs(60)), now);
        s.set(key("forever"), key("v"), None, now);

        let removed = s.sweep_expired(now + Duration::from_millis(200));

        assert_eq!(removed, 1);
        assert_eq!(s.len(), 2);
        assert!(s.get(&key("long"), now + Duration::from_millis(200)).is_some());
    }

    #[test]
    fn test_store_sweep_after_delete_does_not_double_remove() {
        let mut s = store(100);
        let now = Instant::now();

        s.set(key("k"), key("v"), Some(Duration::from_millis(50)), now);
        s.delete(&key("k"));

        // The expiry record went away with the delete
        assert_eq!(s.sweep_expired(now + Duration::from_secs(1)), 0);
    }

    #[test]
    fn test_store_update_absent_then_present() {
        let mut s = store(100);
        let now = Instant::now();

        let v = s.update(key("counter"), None, |current| match current {
            Some(v) => format!("{v}+"),
            None => key("start"),
        }, now);
        assert_eq!(v, key("start"));

        let v = s.update(key("counter"), None, |current| match current {
            Some(v) => format!("{v}+"),
            None => key("start"),
        }, now);
        assert_eq!(v, key("start+"));
    }

    #[test]
    fn test_store_update_expired_sees_none() {
        let mut s = store(100);
        let now = Instant::now();

        s.set(key("k"), key("old"), Some(Duration::from_millis(100)), now);

        let later = now + Duration::from_millis(200);
        let v = s.update(key("k"), None, |current| {
            assert!(current.is_none());
            key("fresh")
        }, later);
        assert_eq!(v, key("fresh"));
    }

    #[test]
    fn test_store_default_ttl_applies() {
        let mut s: CacheStore<String, String> = CacheStore::new(
            CacheConfig::new(10).with_default_ttl(Duration::from_millis(100)),
        )
        .unwrap();
        let now = Instant::now();

        s.set(key("k"), key("v"), None, now);

        assert_eq!(s.get(&key("k"), now + Duration::from_millis(150)), None);
    }

    #[test]
    fn test_store_stats() {
        let mut s = store(100);
        let now = Instant::now();

        s.set(key("key1"), key("value1"), None, now);
        s.get(&key("key1"), now); // hit
        s.get(&key("nonexistent"), now); // miss

        let stats = s.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_entries, 1);
    }
}
