//! Cache configuration types.
//!
//! `CacheConfig` represents the top-level `config.toml` that names the
//! backend cache API, the datasets (backend tables) to serve, and the TTL
//! and retry settings for the chunk cache.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration for pincache.
///
/// Loaded from `~/.pincache/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Base URL of the backend cache API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Backend project namespace the tables live under.
    #[serde(default = "default_project")]
    pub project: String,

    /// How long a fetched chunk stays fresh.
    #[serde(default = "default_ttl_secs")]
    pub chunk_ttl_secs: u64,

    /// How long a fetched record count / chunk list stays fresh.
    #[serde(default = "default_ttl_secs")]
    pub count_ttl_secs: u64,

    /// How long a whole-tab dataset stays fresh in the tab cache.
    #[serde(default = "default_ttl_secs")]
    pub tab_ttl_secs: u64,

    /// Per-request timeout against the backend.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Upper bound on concurrent chunk fetches during a full load.
    #[serde(default = "default_max_concurrent_chunks")]
    pub max_concurrent_chunks: usize,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub datasets: Vec<DatasetConfig>,
}

fn default_base_url() -> String {
    "https://brmh.in".to_string()
}

fn default_project() -> String {
    "my-app".to_string()
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent_chunks() -> usize {
    4
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            project: default_project(),
            chunk_ttl_secs: default_ttl_secs(),
            count_ttl_secs: default_ttl_secs(),
            tab_ttl_secs: default_ttl_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            max_concurrent_chunks: default_max_concurrent_chunks(),
            retry: RetryConfig::default(),
            datasets: Vec::new(),
        }
    }
}

impl CacheConfig {
    pub fn chunk_ttl(&self) -> Duration {
        Duration::from_secs(self.chunk_ttl_secs)
    }

    pub fn count_ttl(&self) -> Duration {
        Duration::from_secs(self.count_ttl_secs)
    }

    pub fn tab_ttl(&self) -> Duration {
        Duration::from_secs(self.tab_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Look up a dataset by name.
    pub fn dataset(&self, name: &str) -> Option<&DatasetConfig> {
        self.datasets.iter().find(|d| d.name == name)
    }

    /// Effective chunk TTL for a dataset (per-dataset override or global).
    pub fn chunk_ttl_for(&self, dataset: &DatasetConfig) -> Duration {
        Duration::from_secs(dataset.chunk_ttl_secs.unwrap_or(self.chunk_ttl_secs))
    }

    /// Check invariants that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_chunks == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_chunks must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for dataset in &self.datasets {
            if dataset.name.trim().is_empty() {
                return Err(ConfigError::Invalid("dataset name must not be empty".to_string()));
            }
            if dataset.table.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "dataset '{}' has an empty table",
                    dataset.name
                )));
            }
            if !seen.insert(dataset.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate dataset name '{}'",
                    dataset.name
                )));
            }
        }

        Ok(())
    }
}

/// Retry settings for backend fetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per fetch, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Linear backoff step: attempt `n` waits `n * backoff_ms` before retrying.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    1000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

/// A named dataset backed by one backend table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Name used on the CLI and in gateway URLs (e.g. "pins").
    pub name: String,
    /// Backend table holding the chunks (e.g. "pinterest_inkhub_get_pins").
    pub table: String,
    /// Overrides `chunk_ttl_secs` for this dataset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_ttl_secs: Option<u64>,
}
