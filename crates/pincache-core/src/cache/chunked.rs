//! Chunked read-through cache for one backend table.
//!
//! Every lookup goes cache -> coalescer -> retry loop -> [`ChunkSource`].
//! A fresh cached chunk is returned immediately. On a miss, concurrent
//! callers for the same chunk share one retried fetch, and a successful
//! result is stored with the current timestamp. Failures are returned to
//! every waiter and never cached.
//!
//! The record count and the chunk list are cached the same way, under
//! their own TTL.
//!
//! Invalidation bumps a generation and detaches in-flight fetches, so the
//! next lookup refetches and a fetch that started earlier never stores its
//! result.

use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream;
use tracing::{debug, warn};

use pincache_types::chunk::{ChunkData, ChunkKey, LoadedDataset};
use pincache_types::config::{CacheConfig, DatasetConfig};
use pincache_types::error::FetchError;
use pincache_types::stats::CacheStats;

use crate::clock::{Clock, system_clock};
use crate::fetch::retry::RetryPolicy;
use crate::fetch::source::ChunkSource;

use super::coalesce::Coalescer;
use super::generation::{Generations, store_if_current};
use super::ttl::TtlCache;

/// Construction options for a [`ChunkedCache`].
#[derive(Debug, Clone)]
pub struct ChunkedCacheOptions {
    pub chunk_ttl: Duration,
    pub count_ttl: Duration,
    pub retry: RetryPolicy,
    pub max_concurrent_chunks: usize,
    pub clock: Arc<dyn Clock>,
}

impl Default for ChunkedCacheOptions {
    fn default() -> Self {
        let config = CacheConfig::default();
        Self {
            chunk_ttl: config.chunk_ttl(),
            count_ttl: config.count_ttl(),
            retry: RetryPolicy::from(&config.retry),
            max_concurrent_chunks: config.max_concurrent_chunks,
            clock: system_clock(),
        }
    }
}

impl ChunkedCacheOptions {
    /// Options for `dataset`, honouring its per-dataset TTL override.
    pub fn for_dataset(config: &CacheConfig, dataset: &DatasetConfig) -> Self {
        Self {
            chunk_ttl: config.chunk_ttl_for(dataset),
            count_ttl: config.count_ttl(),
            retry: RetryPolicy::from(&config.retry),
            max_concurrent_chunks: config.max_concurrent_chunks.max(1),
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    failures: AtomicU64,
    retries: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

struct Inner<S> {
    table: String,
    source: Arc<S>,
    chunks: TtlCache<u32, ChunkData>,
    count: TtlCache<(), usize>,
    indices: TtlCache<(), Arc<Vec<u32>>>,
    chunk_fetches: Coalescer<u32, ChunkData>,
    count_fetches: Coalescer<(), usize>,
    index_fetches: Coalescer<(), Arc<Vec<u32>>>,
    generations: Generations<u32>,
    retry: RetryPolicy,
    max_concurrent_chunks: usize,
    counters: Counters,
}

impl<S: ChunkSource> Inner<S> {
    /// Fetch with retry and record the outcome in the counters.
    async fn fetch_tracked<T, F, Fut>(&self, label: &str, op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, FetchError>>,
    {
        Counters::bump(&self.counters.fetches, 1);
        let outcome = self.retry.run(label, op).await;
        Counters::bump(&self.counters.retries, u64::from(outcome.retries));

        if let Err(error) = &outcome.result {
            Counters::bump(&self.counters.failures, 1);
            warn!(
                operation = label,
                error = %error,
                retries = outcome.retries,
                "fetch failed"
            );
        }
        outcome.result
    }
}

/// Read-through cache over the chunks of one backend table.
///
/// Cheap to clone; clones share the same cache state.
pub struct ChunkedCache<S: ChunkSource> {
    inner: Arc<Inner<S>>,
}

impl<S: ChunkSource> Clone for ChunkedCache<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: ChunkSource> std::fmt::Debug for ChunkedCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedCache")
            .field("table", &self.inner.table)
            .field("entries", &self.inner.chunks.len())
            .finish()
    }
}

impl<S: ChunkSource> ChunkedCache<S> {
    pub fn new(table: impl Into<String>, source: Arc<S>, options: ChunkedCacheOptions) -> Self {
        let inner = Inner {
            table: table.into(),
            source,
            chunks: TtlCache::with_clock(options.chunk_ttl, options.clock.clone()),
            count: TtlCache::with_clock(options.count_ttl, options.clock.clone()),
            indices: TtlCache::with_clock(options.count_ttl, options.clock),
            chunk_fetches: Coalescer::new(),
            count_fetches: Coalescer::new(),
            index_fetches: Coalescer::new(),
            generations: Generations::new(),
            retry: options.retry,
            max_concurrent_chunks: options.max_concurrent_chunks.max(1),
            counters: Counters::default(),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn table(&self) -> &str {
        &self.inner.table
    }

    /// Get chunk `index`, from cache if fresh, otherwise from the backend.
    pub async fn get_chunk(&self, index: u32) -> Result<ChunkData, FetchError> {
        if let Some(hit) = self.inner.chunks.get(&index) {
            Counters::bump(&self.inner.counters.hits, 1);
            debug!(table = %self.inner.table, index, "chunk cache hit");
            return Ok(hit);
        }
        Counters::bump(&self.inner.counters.misses, 1);

        let inner = self.inner.clone();
        let started = self.inner.generations.current(&index);
        self.inner
            .chunk_fetches
            .run(index, move || async move {
                let label = ChunkKey::new(inner.table.as_str(), index).to_string();
                let records = inner
                    .fetch_tracked(&label, || inner.source.fetch_chunk(&inner.table, index))
                    .await?;

                debug!(chunk = %label, records = records.len(), "chunk fetched");
                let data: ChunkData = Arc::new(records);
                let kept = store_if_current(&inner.chunks, index, data.clone(), started, || {
                    inner.generations.current(&index)
                });
                if !kept {
                    debug!(chunk = %label, "chunk invalidated during fetch, not cached");
                }
                Ok(data)
            })
            .await
    }

    /// Total number of records in the table.
    pub async fn get_count(&self) -> Result<usize, FetchError> {
        if let Some(count) = self.inner.count.get(&()) {
            Counters::bump(&self.inner.counters.hits, 1);
            return Ok(count);
        }
        Counters::bump(&self.inner.counters.misses, 1);

        let inner = self.inner.clone();
        let started = self.inner.generations.current_global();
        self.inner
            .count_fetches
            .run((), move || async move {
                let label = format!("{}/count", inner.table);
                let count = inner
                    .fetch_tracked(&label, || inner.source.fetch_count(&inner.table))
                    .await?;
                store_if_current(&inner.count, (), count, started, || {
                    inner.generations.current_global()
                });
                Ok(count)
            })
            .await
    }

    /// Chunk indices the backend holds for this table, ascending.
    pub async fn chunk_indices(&self) -> Result<Arc<Vec<u32>>, FetchError> {
        if let Some(indices) = self.inner.indices.get(&()) {
            Counters::bump(&self.inner.counters.hits, 1);
            return Ok(indices);
        }
        Counters::bump(&self.inner.counters.misses, 1);

        let inner = self.inner.clone();
        let started = self.inner.generations.current_global();
        self.inner
            .index_fetches
            .run((), move || async move {
                let label = format!("{}/chunks", inner.table);
                let mut indices = inner
                    .fetch_tracked(&label, || inner.source.list_chunks(&inner.table))
                    .await?;
                indices.sort_unstable();
                indices.dedup();

                let indices = Arc::new(indices);
                store_if_current(&inner.indices, (), indices.clone(), started, || {
                    inner.generations.current_global()
                });
                Ok(indices)
            })
            .await
    }

    /// Load every chunk of the table.
    ///
    /// Fails only if the chunk list itself cannot be fetched; individual
    /// chunk failures are reported in [`LoadedDataset::failed`].
    pub async fn load_all(&self) -> Result<LoadedDataset, FetchError> {
        self.load_all_with_progress(|_, _| {}).await
    }

    /// Like [`Self::load_all`], calling `progress(done, total)` after each chunk.
    pub async fn load_all_with_progress<P>(&self, progress: P) -> Result<LoadedDataset, FetchError>
    where
        P: FnMut(usize, usize),
    {
        let indices = self.chunk_indices().await?;
        Ok(self.load_indices(indices.as_slice(), progress).await)
    }

    /// Load the listed chunks whose index falls within `range`.
    pub async fn load_range(&self, range: Range<u32>) -> Result<LoadedDataset, FetchError> {
        let indices = self.chunk_indices().await?;
        let selected: Vec<u32> = indices
            .iter()
            .copied()
            .filter(|i| range.contains(i))
            .collect();
        Ok(self.load_indices(&selected, |_, _| {}).await)
    }

    async fn load_indices<P>(&self, indices: &[u32], mut progress: P) -> LoadedDataset
    where
        P: FnMut(usize, usize),
    {
        let total = indices.len();
        let mut results = stream::iter(indices.iter().copied())
            .map(|index| async move { (index, self.get_chunk(index).await) })
            .buffered(self.inner.max_concurrent_chunks);

        let mut loaded = LoadedDataset::default();
        let mut done = 0;
        while let Some((index, result)) = results.next().await {
            match result {
                Ok(chunk) => {
                    loaded.records.extend(chunk.iter().cloned());
                    loaded.chunks_loaded += 1;
                }
                Err(error) => loaded.failed.push((index, error)),
            }
            done += 1;
            progress(done, total);
        }

        debug!(
            table = %self.inner.table,
            chunks = loaded.chunks_loaded,
            failed = loaded.failed.len(),
            records = loaded.records.len(),
            "dataset loaded"
        );
        loaded
    }

    /// Warm chunk `index` in the background.
    pub fn prefetch(&self, index: u32) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            if let Err(error) = cache.get_chunk(index).await {
                debug!(table = %cache.inner.table, index, error = %error, "prefetch failed");
            }
        })
    }

    /// Drop one cached chunk. Returns whether it was cached.
    ///
    /// A fetch of the chunk that is already running will not be cached and
    /// is not joined by later lookups.
    pub fn invalidate_chunk(&self, index: u32) -> bool {
        let inner = &self.inner;
        inner.generations.bump(&index);
        inner.chunk_fetches.forget(&index);
        inner.chunks.invalidate(&index)
    }

    /// Drop all cached chunks, the count, and the chunk list, and fence off
    /// every running fetch.
    pub fn invalidate_all(&self) {
        let inner = &self.inner;
        inner.generations.bump_all();
        inner.chunk_fetches.forget_all();
        inner.count_fetches.forget_all();
        inner.index_fetches.forget_all();
        inner.chunks.clear();
        inner.count.clear();
        inner.indices.clear();
    }

    /// Drop stale entries. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        self.inner.chunks.purge_expired()
            + self.inner.count.purge_expired()
            + self.inner.indices.purge_expired()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = &self.inner;
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CacheStats {
            hits: load(&inner.counters.hits),
            misses: load(&inner.counters.misses),
            coalesced: inner.chunk_fetches.coalesced()
                + inner.count_fetches.coalesced()
                + inner.index_fetches.coalesced(),
            fetches: load(&inner.counters.fetches),
            failures: load(&inner.counters.failures),
            retries: load(&inner.counters.retries),
            entries: inner.chunks.len(),
            expired_evictions: inner.chunks.expired_evictions()
                + inner.count.expired_evictions()
                + inner.indices.expired_evictions(),
        }
    }
}
