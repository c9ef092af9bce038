//! Per-view dataset cache.
//!
//! Keeps the fully loaded dataset behind each dashboard view ("pins",
//! "boards", "products" ...) for a TTL, so switching back to a view does not
//! reload it. Loads for the same view are coalesced, and a load that was
//! running when its view was invalidated is not kept.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use pincache_types::chunk::{ChunkData, Record};
use pincache_types::error::FetchError;

use crate::clock::{Clock, system_clock};

use super::coalesce::Coalescer;
use super::generation::{Generations, store_if_current};
use super::ttl::TtlCache;

struct TabInner {
    data: TtlCache<String, ChunkData>,
    loads: Coalescer<String, ChunkData>,
    generations: Generations<String>,
}

/// TTL cache of whole datasets keyed by view name.
#[derive(Clone)]
pub struct TabDataCache {
    inner: Arc<TabInner>,
}

impl std::fmt::Debug for TabDataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TabDataCache")
            .field("tabs", &self.inner.data.len())
            .field("ttl", &self.inner.data.ttl())
            .finish()
    }
}

impl TabDataCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, system_clock())
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(TabInner {
                data: TtlCache::with_clock(ttl, clock),
                loads: Coalescer::new(),
                generations: Generations::new(),
            }),
        }
    }

    /// Fresh data for `tab`, if any.
    pub fn get(&self, tab: &str) -> Option<ChunkData> {
        self.inner.data.get(&tab.to_string())
    }

    /// Return fresh data for `tab`, or run `loader` and keep its result.
    ///
    /// Concurrent calls for the same tab share one load. Errors are
    /// returned to every waiter and not kept.
    pub async fn get_or_load<F, Fut>(&self, tab: &str, loader: F) -> Result<ChunkData, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Record>, FetchError>> + Send + 'static,
    {
        if let Some(hit) = self.get(tab) {
            debug!(tab, "tab cache hit");
            return Ok(hit);
        }

        let inner = self.inner.clone();
        let key = tab.to_string();
        let started = self.inner.generations.current(&key);
        self.inner
            .loads
            .run(key.clone(), move || {
                let load = loader();
                async move {
                    let records = load.await?;
                    debug!(tab = %key, records = records.len(), "tab data loaded");
                    let data: ChunkData = Arc::new(records);
                    let current = || inner.generations.current(&key);
                    if !store_if_current(&inner.data, key.clone(), data.clone(), started, current) {
                        debug!(tab = %key, "tab invalidated during load, not cached");
                    }
                    Ok(data)
                }
            })
            .await
    }

    /// Store `records` for `tab`, replacing anything cached.
    pub fn insert(&self, tab: &str, records: Vec<Record>) -> ChunkData {
        let data: ChunkData = Arc::new(records);
        self.inner.data.insert(tab.to_string(), data.clone());
        data
    }

    /// Drop `tab`. A load of it that is still running will not be kept.
    pub fn invalidate(&self, tab: &str) -> bool {
        let key = tab.to_string();
        self.inner.generations.bump(&key);
        self.inner.loads.forget(&key);
        self.inner.data.invalidate(&key)
    }

    pub fn clear(&self) {
        self.inner.generations.bump_all();
        self.inner.loads.forget_all();
        self.inner.data.clear();
    }

    /// Drop stale tabs. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        self.inner.data.purge_expired()
    }

    pub fn is_fresh(&self, tab: &str) -> bool {
        self.age(tab)
            .is_some_and(|age| age < self.inner.data.ttl())
    }

    /// Time since `tab` was last stored, fresh or not.
    pub fn age(&self, tab: &str) -> Option<Duration> {
        self.inner.data.age(&tab.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache() -> (TabDataCache, ManualClock) {
        let clock = ManualClock::new();
        let cache = TabDataCache::with_clock(Duration::from_secs(120), Arc::new(clock.clone()));
        (cache, clock)
    }

    #[tokio::test]
    async fn test_get_or_load_caches_result() {
        let (cache, _clock) = cache();
        let loads = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let loads = loads.clone();
            let data = cache
                .get_or_load("boards", move || async move {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![json!({"id": "b1"}), json!({"id": "b2"})])
                })
                .await
                .unwrap();
            assert_eq!(data.len(), 2);
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(cache.is_fresh("boards"));
    }

    #[tokio::test]
    async fn test_stale_tab_reloads() {
        let (cache, clock) = cache();
        cache.insert("pins", vec![json!({"id": 1})]);
        assert!(cache.is_fresh("pins"));

        clock.advance(Duration::from_secs(120));
        assert!(!cache.is_fresh("pins"));
        assert_eq!(cache.age("pins"), Some(Duration::from_secs(120)));
        assert!(cache.get("pins").is_none());

        let data = cache
            .get_or_load("pins", || async { Ok(vec![json!({"id": 1}), json!({"id": 2})]) })
            .await
            .unwrap();
        assert_eq!(data.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_load_is_not_kept() {
        let (cache, _clock) = cache();

        let err = cache
            .get_or_load("orders", || async { Err(FetchError::Unauthorized) })
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Unauthorized);
        assert!(cache.get("orders").is_none());
        assert!(!cache.is_fresh("orders"));
    }

    #[test]
    fn test_invalidate_and_clear() {
        let (cache, _clock) = cache();
        cache.insert("pins", vec![]);
        cache.insert("boards", vec![]);

        assert!(cache.invalidate("pins"));
        assert!(cache.get("pins").is_none());
        assert!(cache.get("boards").is_some());

        cache.clear();
        assert!(cache.get("boards").is_none());
    }

    #[test]
    fn test_purge_expired_drops_stale_tabs() {
        let (cache, clock) = cache();
        cache.insert("pins", vec![json!({"id": 1})]);
        clock.advance(Duration::from_secs(60));
        cache.insert("boards", vec![]);

        assert_eq!(cache.purge_expired(), 0);
        clock.advance(Duration::from_secs(60));
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.age("pins").is_none());
        assert!(cache.age("boards").is_some());
    }

    #[tokio::test]
    async fn test_load_running_across_invalidate_is_not_kept() {
        let (cache, _clock) = cache();

        let early = tokio::spawn({
            let cache = cache.clone();
            async move {
                cache
                    .get_or_load("pins", || async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(vec![json!({"version": 0})])
                    })
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!cache.invalidate("pins"));

        let fresh = cache
            .get_or_load("pins", || async { Ok(vec![json!({"version": 1})]) })
            .await
            .unwrap();
        assert_eq!(fresh[0]["version"], 1);

        let stale = early.await.unwrap().unwrap();
        assert_eq!(stale[0]["version"], 0);
        assert_eq!(cache.get("pins").unwrap()[0]["version"], 1);
    }
}
