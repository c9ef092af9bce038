//! Invalidation generations.
//!
//! A fetch remembers the generation of its key when it starts and only
//! stores its result if the generation is unchanged when it finishes, so a
//! load that was running across an invalidation cannot write its
//! pre-invalidation data back into the cache.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use super::ttl::TtlCache;

/// `(global, per-key)` generation pair.
pub type Generation = (u64, u64);

/// A global generation bumped by clear-all, plus one per key.
#[derive(Debug)]
pub struct Generations<K>
where
    K: Eq + Hash,
{
    global: AtomicU64,
    per_key: DashMap<K, u64>,
}

impl<K> Generations<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            global: AtomicU64::new(0),
            per_key: DashMap::new(),
        }
    }

    /// Current generation of `key`.
    pub fn current(&self, key: &K) -> Generation {
        let global = self.global.load(Ordering::Acquire);
        let local = self.per_key.get(key).map(|g| *g).unwrap_or(0);
        (global, local)
    }

    /// Current global generation, for values that have no per-key entry.
    pub fn current_global(&self) -> Generation {
        (self.global.load(Ordering::Acquire), 0)
    }

    /// Invalidate one key.
    pub fn bump(&self, key: &K) {
        *self.per_key.entry(key.clone()).or_insert(0) += 1;
    }

    /// Invalidate every key.
    pub fn bump_all(&self) {
        self.global.fetch_add(1, Ordering::AcqRel);
        // Per-key counters restart under the new global generation.
        self.per_key.clear();
    }
}

impl<K> Default for Generations<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Insert `value` unless `current()` has moved past `started`.
///
/// Returns whether the value was kept. An invalidation that lands between
/// the check and the insert is caught by the second check.
pub fn store_if_current<K, V>(
    cache: &TtlCache<K, V>,
    key: K,
    value: V,
    started: Generation,
    current: impl Fn() -> Generation,
) -> bool
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    if current() != started {
        return false;
    }
    cache.insert(key.clone(), value);
    if current() != started {
        cache.invalidate(&key);
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_bump_changes_only_that_key() {
        let generations = Generations::<u32>::new();
        let before_1 = generations.current(&1);
        let before_2 = generations.current(&2);

        generations.bump(&1);
        assert_ne!(generations.current(&1), before_1);
        assert_eq!(generations.current(&2), before_2);
    }

    #[test]
    fn test_bump_all_changes_every_key() {
        let generations = Generations::<u32>::new();
        generations.bump(&1);
        let before_1 = generations.current(&1);
        let before_2 = generations.current(&2);
        let before_global = generations.current_global();

        generations.bump_all();
        assert_ne!(generations.current(&1), before_1);
        assert_ne!(generations.current(&2), before_2);
        assert_ne!(generations.current_global(), before_global);
    }

    #[test]
    fn test_store_skipped_after_invalidation() {
        let cache = TtlCache::<u32, &str>::new(Duration::from_secs(60));
        let generations = Generations::<u32>::new();

        let started = generations.current(&0);
        assert!(store_if_current(&cache, 0, "fresh", started, || generations.current(&0)));
        assert_eq!(cache.get(&0), Some("fresh"));

        let started = generations.current(&0);
        generations.bump(&0);
        cache.invalidate(&0);
        assert!(!store_if_current(&cache, 0, "stale", started, || generations.current(&0)));
        assert_eq!(cache.get(&0), None);
    }
}
