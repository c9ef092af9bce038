//! In-flight request coalescing.
//!
//! At most one fetch per key is outstanding at any time. The first caller
//! for a key starts the fetch; every caller that arrives while it is still
//! running awaits the same shared future and receives a clone of its result.
//! Results are not retained: once the fetch settles the key is free again,
//! so a failure is never replayed to later callers.
//!
//! [`Coalescer::forget`] detaches a running fetch from its key so the next
//! caller starts a new one. Callers already waiting on the detached fetch
//! still receive its result.

use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::future::{BoxFuture, FutureExt, Shared};

use pincache_types::error::FetchError;

type SharedFetch<V> = Shared<BoxFuture<'static, Result<V, FetchError>>>;

/// Registry of in-flight fetches keyed by `K`.
pub struct Coalescer<K, V>
where
    K: Eq + Hash,
{
    in_flight: DashMap<K, (u64, SharedFetch<V>)>,
    next_id: AtomicU64,
    coalesced: AtomicU64,
}

impl<K, V> Coalescer<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: DashMap::new(),
            next_id: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    /// Run the fetch for `key`, or join the one already running.
    ///
    /// `make` is only invoked when no fetch for `key` is in flight.
    pub async fn run<F, Fut>(&self, key: K, make: F) -> Result<V, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        let (fetch, _guard) = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(existing) => {
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                (existing.get().1.clone(), None)
            }
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let fetch = make().boxed().shared();
                slot.insert((id, fetch.clone()));
                let guard = InFlightGuard {
                    map: &self.in_flight,
                    key,
                    id,
                };
                (fetch, Some(guard))
            }
        };

        fetch.await
    }

    /// Detach the fetch running for `key`, if any. Returns whether one was.
    pub fn forget(&self, key: &K) -> bool {
        self.in_flight.remove(key).is_some()
    }

    /// Detach every running fetch.
    pub fn forget_all(&self) {
        self.in_flight.clear();
    }

    /// Number of fetches currently outstanding.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Total callers that joined an existing fetch.
    pub fn coalesced(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }
}

impl<K, V> Default for Coalescer<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> std::fmt::Debug for Coalescer<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coalescer")
            .field("in_flight", &self.in_flight.len())
            .field("coalesced", &self.coalesced.load(Ordering::Relaxed))
            .finish()
    }
}

/// Removes the starter's in-flight entry when the starter finishes or is
/// dropped. Only the entry it registered is removed, never a newer one.
struct InFlightGuard<'a, K, V>
where
    K: Eq + Hash,
{
    map: &'a DashMap<K, (u64, SharedFetch<V>)>,
    key: K,
    id: u64,
}

impl<K, V> Drop for InFlightGuard<'_, K, V>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        self.map.remove_if(&self.key, |_, (id, _)| *id == self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let coalescer = Coalescer::<u32, u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let callers = (0..10).map(|_| {
            let calls = calls.clone();
            coalescer.run(7, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(42)
            })
        });
        let results = futures_util::future::join_all(callers).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| r == &Ok(42)));
        assert_eq!(coalescer.coalesced(), 9);
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_fetch_independently() {
        let coalescer = Coalescer::<u32, u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let callers = (0..3).map(|key| {
            let calls = calls.clone();
            coalescer.run(key, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(key * 10)
            })
        });
        let results = futures_util::future::join_all(callers).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(results, vec![Ok(0), Ok(10), Ok(20)]);
        assert_eq!(coalescer.coalesced(), 0);
    }

    #[tokio::test]
    async fn test_errors_are_shared_but_not_retained() {
        let coalescer = Coalescer::<u32, u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let failing = {
            let calls = calls.clone();
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err(FetchError::Network("connection reset".to_string()))
            }
        };
        let (a, b) = tokio::join!(
            coalescer.run(1, failing.clone()),
            coalescer.run(1, failing)
        );
        assert_eq!(a, Err(FetchError::Network("connection reset".to_string())));
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The next call starts a fresh fetch
        let ok = coalescer.run(1, || async { Ok(5) }).await;
        assert_eq!(ok, Ok(5));
    }

    #[tokio::test]
    async fn test_dropped_starter_frees_the_key() {
        let coalescer = Coalescer::<u32, u32>::new();

        let timed_out = tokio::time::timeout(
            Duration::from_millis(5),
            coalescer.run(3, || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(1)
            }),
        )
        .await;
        assert!(timed_out.is_err());
        assert_eq!(coalescer.in_flight(), 0);

        let fresh = coalescer.run(3, || async { Ok(2) }).await;
        assert_eq!(fresh, Ok(2));
    }

    async fn wait_until(mut ready: impl FnMut() -> bool) {
        while !ready() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_waiter_completes_after_starter_is_aborted() {
        let coalescer = Arc::new(Coalescer::<u32, u32>::new());
        let (release, released) = tokio::sync::oneshot::channel::<()>();

        let starter = tokio::spawn({
            let coalescer = coalescer.clone();
            async move {
                coalescer
                    .run(7, move || async move {
                        let _ = released.await;
                        Ok(7)
                    })
                    .await
            }
        });
        wait_until(|| coalescer.in_flight() == 1).await;

        let waiter = tokio::spawn({
            let coalescer = coalescer.clone();
            async move { coalescer.run(7, || async { Ok(0) }).await }
        });
        wait_until(|| coalescer.coalesced() == 1).await;

        starter.abort();
        assert!(starter.await.unwrap_err().is_cancelled());
        assert_eq!(coalescer.in_flight(), 0);

        release.send(()).unwrap();
        assert_eq!(waiter.await.unwrap(), Ok(7));
    }

    #[tokio::test]
    async fn test_old_starter_never_removes_newer_fetch() {
        let coalescer = Arc::new(Coalescer::<u32, u32>::new());
        let (_release_old, old_released) = tokio::sync::oneshot::channel::<()>();
        let (release_new, new_released) = tokio::sync::oneshot::channel::<()>();

        let old = tokio::spawn({
            let coalescer = coalescer.clone();
            async move {
                coalescer
                    .run(3, move || async move {
                        let _ = old_released.await;
                        Ok(1)
                    })
                    .await
            }
        });
        wait_until(|| coalescer.in_flight() == 1).await;
        assert!(coalescer.forget(&3));
        assert_eq!(coalescer.in_flight(), 0);

        let new = tokio::spawn({
            let coalescer = coalescer.clone();
            async move {
                coalescer
                    .run(3, move || async move {
                        let _ = new_released.await;
                        Ok(2)
                    })
                    .await
            }
        });
        wait_until(|| coalescer.in_flight() == 1).await;

        // The old starter's guard must leave the newer registration alone
        old.abort();
        let _ = old.await;
        assert_eq!(coalescer.in_flight(), 1);

        let joined = tokio::spawn({
            let coalescer = coalescer.clone();
            async move { coalescer.run(3, || async { Ok(0) }).await }
        });
        wait_until(|| coalescer.coalesced() == 1).await;

        release_new.send(()).unwrap();
        assert_eq!(new.await.unwrap(), Ok(2));
        assert_eq!(joined.await.unwrap(), Ok(2));
        assert_eq!(coalescer.in_flight(), 0);
    }
}
