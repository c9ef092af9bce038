//! In-memory TTL cache.
//!
//! A concurrent map from key to `(value, inserted_at)`. Entries are served
//! only while younger than the TTL; stale entries are dropped lazily on
//! access or in bulk by [`TtlCache::purge_expired`]. There is no size-based
//! eviction.

use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::clock::{Clock, system_clock};

#[derive(Debug)]
struct TimedEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// Concurrent key/value cache with a single time-to-live for all entries.
#[derive(Debug)]
pub struct TtlCache<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, TimedEntry<V>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    expired_evictions: AtomicU64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache driven by the system clock.
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, system_clock())
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            clock,
            expired_evictions: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_fresh(&self, inserted_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(inserted_at) < self.ttl
    }

    /// Return the value for `key` if present and younger than the TTL.
    ///
    /// A stale entry is removed as a side effect.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();

        // The read guard must be released before the entry can be removed.
        {
            let entry = self.entries.get(key)?;
            if self.is_fresh(entry.inserted_at, now) {
                return Some(entry.value.clone());
            }
        }

        if self
            .entries
            .remove_if(key, |_, e| !self.is_fresh(e.inserted_at, now))
            .is_some()
        {
            self.expired_evictions.fetch_add(1, Ordering::Relaxed);
        }
        None
    }

    /// Store `value` under `key`, replacing and restamping any prior entry.
    pub fn insert(&self, key: K, value: V) {
        let inserted_at = self.clock.now();
        self.entries.insert(key, TimedEntry { value, inserted_at });
    }

    /// Remove `key`. Returns whether an entry was present.
    pub fn invalidate(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drop every stale entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0usize;
        self.entries.retain(|_, e| {
            let keep = self.is_fresh(e.inserted_at, now);
            if !keep {
                removed += 1;
            }
            keep
        });
        self.expired_evictions
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Time since `key` was inserted, whether or not it is still fresh.
    pub fn age(&self, key: &K) -> Option<Duration> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .map(|e| now.saturating_duration_since(e.inserted_at))
    }

    /// Number of held entries, including stale ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn expired_evictions(&self) -> u64 {
        self.expired_evictions.load(Ordering::Relaxed)
    }
}
