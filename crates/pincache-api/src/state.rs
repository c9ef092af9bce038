//! Application state wiring the cache registry together.
//!
//! AppState holds the registry used by both CLI commands and HTTP handlers.
//! It is generic over the chunk source so the gateway can be exercised
//! against an in-memory source; the binary pins it to [`HttpChunkSource`].

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use pincache_core::fetch::source::ChunkSource;
use pincache_core::registry::CacheRegistry;
use pincache_infra::config::{load_validated_config, resolve_data_dir};
use pincache_infra::http::HttpChunkSource;
use pincache_types::config::CacheConfig;

/// Shared application state.
pub struct AppState<S: ChunkSource = HttpChunkSource> {
    pub config: Arc<CacheConfig>,
    pub registry: Arc<CacheRegistry<S>>,
    pub data_dir: PathBuf,
}

impl<S: ChunkSource> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            registry: self.registry.clone(),
            data_dir: self.data_dir.clone(),
        }
    }
}

impl AppState<HttpChunkSource> {
    /// Initialize the application state: load config, build the HTTP source
    /// and one cache per configured dataset.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        let config = load_validated_config(&data_dir)
            .await
            .with_context(|| format!("Invalid configuration in {}", data_dir.display()))?;

        let source = HttpChunkSource::from_config(&config)?;
        tracing::debug!(
            base_url = %source.base_url(),
            project = %config.project,
            datasets = config.datasets.len(),
            "backend configured"
        );

        Ok(Self::with_source(config, Arc::new(source), data_dir))
    }
}

impl<S: ChunkSource> AppState<S> {
    pub fn with_source(config: CacheConfig, source: Arc<S>, data_dir: PathBuf) -> Self {
        let registry = CacheRegistry::from_config(&config, source);
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            data_dir,
        }
    }

    /// Look up a dataset's cache, with a helpful error for the CLI.
    pub fn cache(
        &self,
        dataset: &str,
    ) -> anyhow::Result<&pincache_core::cache::chunked::ChunkedCache<S>> {
        self.registry.get(dataset).with_context(|| {
            let known = self.registry.names().join(", ");
            if known.is_empty() {
                format!(
                    "Dataset '{dataset}' not found (no datasets configured in {})",
                    self.data_dir.join("config.toml").display()
                )
            } else {
                format!("Dataset '{dataset}' not found (known: {known})")
            }
        })
    }
}
