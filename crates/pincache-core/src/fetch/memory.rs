//! In-process chunk source.
//!
//! Holds tables in memory and can be told to fail specific chunk fetches.
//! Used to exercise the cache without a backend, and by the gateway tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;

use pincache_types::chunk::{ChunkKey, Record};
use pincache_types::error::FetchError;

use super::source::ChunkSource;

/// A [`ChunkSource`] backed by in-memory tables.
#[derive(Debug, Default)]
pub struct MemorySource {
    tables: DashMap<String, BTreeMap<u32, Vec<Record>>>,
    failures: DashMap<(String, u32), VecDeque<FetchError>>,
    latency: Duration,
    chunk_calls: AtomicUsize,
    count_calls: AtomicUsize,
    list_calls: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Store `records` as chunk `index` of `table`, replacing any prior chunk.
    pub fn put_chunk(&self, table: &str, index: u32, records: Vec<Record>) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(index, records);
    }

    /// Split `records` into chunks of `chunk_size` and store them as `table`.
    pub fn put_table(&self, table: &str, records: Vec<Record>, chunk_size: usize) {
        let chunk_size = chunk_size.max(1);
        let chunks: BTreeMap<u32, Vec<Record>> = records
            .chunks(chunk_size)
            .enumerate()
            .map(|(i, chunk)| (i as u32, chunk.to_vec()))
            .collect();
        self.tables.insert(table.to_string(), chunks);
    }

    /// Make the next fetch of chunk `index` of `table` fail with `error`.
    ///
    /// Queued failures are consumed in order, one per fetch.
    pub fn fail_next(&self, table: &str, index: u32, error: FetchError) {
        self.failures
            .entry((table.to_string(), index))
            .or_default()
            .push_back(error);
    }

    pub fn chunk_calls(&self) -> usize {
        self.chunk_calls.load(Ordering::SeqCst)
    }

    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn table_not_found(table: &str) -> FetchError {
        FetchError::NotFound {
            key: table.to_string(),
        }
    }
}

impl ChunkSource for MemorySource {
    async fn fetch_chunk(&self, table: &str, index: u32) -> Result<Vec<Record>, FetchError> {
        self.chunk_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let injected = self
            .failures
            .get_mut(&(table.to_string(), index))
            .and_then(|mut queue| queue.pop_front());
        if let Some(error) = injected {
            return Err(error);
        }

        self.tables
            .get(table)
            .and_then(|chunks| chunks.get(&index).cloned())
            .ok_or_else(|| FetchError::NotFound {
                key: ChunkKey::new(table, index).to_string(),
            })
    }

    async fn fetch_count(&self, table: &str) -> Result<usize, FetchError> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        self.tables
            .get(table)
            .map(|chunks| chunks.values().map(Vec::len).sum())
            .ok_or_else(|| Self::table_not_found(table))
    }

    async fn list_chunks(&self, table: &str) -> Result<Vec<u32>, FetchError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        self.tables
            .get(table)
            .map(|chunks| chunks.keys().copied().collect())
            .ok_or_else(|| Self::table_not_found(table))
    }
}
