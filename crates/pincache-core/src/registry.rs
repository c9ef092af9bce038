//! Named datasets and their caches.
//!
//! `CacheRegistry` builds one [`ChunkedCache`] per configured dataset over a
//! shared [`ChunkSource`], plus a [`TabDataCache`] holding each dataset's
//! fully loaded record set.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use pincache_types::chunk::ChunkData;
use pincache_types::config::{CacheConfig, DatasetConfig};
use pincache_types::error::FetchError;
use pincache_types::stats::CacheStats;

use crate::cache::chunked::{ChunkedCache, ChunkedCacheOptions};
use crate::cache::tab::TabDataCache;
use crate::clock::{Clock, system_clock};
use crate::fetch::source::ChunkSource;

struct Entry<S: ChunkSource> {
    dataset: DatasetConfig,
    cache: ChunkedCache<S>,
}

/// Registry of dataset caches keyed by dataset name.
pub struct CacheRegistry<S: ChunkSource> {
    entries: BTreeMap<String, Entry<S>>,
    tabs: TabDataCache,
}

impl<S: ChunkSource> std::fmt::Debug for CacheRegistry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("datasets", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<S: ChunkSource> CacheRegistry<S> {
    pub fn from_config(config: &CacheConfig, source: Arc<S>) -> Self {
        Self::from_config_with_clock(config, source, system_clock())
    }

    pub fn from_config_with_clock(
        config: &CacheConfig,
        source: Arc<S>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let entries = config
            .datasets
            .iter()
            .map(|dataset| {
                let options =
                    ChunkedCacheOptions::for_dataset(config, dataset).with_clock(clock.clone());
                let cache = ChunkedCache::new(dataset.table.clone(), source.clone(), options);
                let entry = Entry {
                    dataset: dataset.clone(),
                    cache,
                };
                (dataset.name.clone(), entry)
            })
            .collect::<BTreeMap<_, _>>();

        info!(datasets = entries.len(), "cache registry initialized");

        Self {
            entries,
            tabs: TabDataCache::with_clock(config.tab_ttl(), clock),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ChunkedCache<S>> {
        self.entries.get(name).map(|e| &e.cache)
    }

    pub fn dataset(&self, name: &str) -> Option<&DatasetConfig> {
        self.entries.get(name).map(|e| &e.dataset)
    }

    /// Dataset names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn datasets(&self) -> impl Iterator<Item = &DatasetConfig> {
        self.entries.values().map(|e| &e.dataset)
    }

    pub fn tabs(&self) -> &TabDataCache {
        &self.tabs
    }

    /// Every record of dataset `name`, served from the tab cache when fresh.
    ///
    /// Only complete loads are kept; if any chunk fails, the first chunk
    /// error is returned and nothing is stored.
    pub async fn load_records(&self, name: &str) -> Result<ChunkData, FetchError> {
        let cache = self
            .get(name)
            .ok_or_else(|| FetchError::NotFound {
                key: name.to_string(),
            })?
            .clone();

        self.tabs
            .get_or_load(name, move || async move {
                let loaded = cache.load_all().await?;
                match loaded.failed.into_iter().next() {
                    Some((index, error)) => {
                        debug!(table = cache.table(), index, error = %error, "incomplete load not cached");
                        Err(error)
                    }
                    None => Ok(loaded.records),
                }
            })
            .await
    }

    /// Drop everything cached for dataset `name`. Returns false if unknown.
    pub fn invalidate(&self, name: &str) -> bool {
        match self.get(name) {
            Some(cache) => {
                cache.invalidate_all();
                self.tabs.invalidate(name);
                true
            }
            None => false,
        }
    }

    pub fn stats(&self) -> BTreeMap<String, CacheStats> {
        self.entries
            .iter()
            .map(|(name, e)| (name.clone(), e.cache.stats()))
            .collect()
    }

    /// Purge stale entries across all datasets and the tab cache. Returns
    /// the total dropped.
    pub fn purge_expired(&self) -> usize {
        let chunks: usize = self
            .entries
            .values()
            .map(|e| e.cache.purge_expired())
            .sum();
        chunks + self.tabs.purge_expired()
    }
}
