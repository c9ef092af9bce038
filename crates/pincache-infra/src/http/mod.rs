//! HTTP client for the backend cache API.
//!
//! Implements [`ChunkSource`] over three endpoints:
//!
//! - `GET {base}/cache/data?project=P&table=T&key=chunk:N` -- one chunk
//! - `GET {base}/cache/data?project=P&table=T` -- the table's cache keys
//! - `GET {base}/cache/count?project=P&table=T` -- the table's record count
//!
//! This is the only place that interprets HTTP status codes. Each call makes
//! a single attempt; retries and caching belong to the core cache.

mod wire;

use std::time::Duration;

use anyhow::Context;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;
use tracing::debug;

use pincache_core::fetch::source::ChunkSource;
use pincache_types::chunk::{ChunkKey, Record};
use pincache_types::config::CacheConfig;
use pincache_types::error::FetchError;

use wire::{ChunkBody, CountBody, KeysBody};

/// User agent sent with every backend request.
pub const USER_AGENT: &str = concat!("pincache/", env!("CARGO_PKG_VERSION"));

/// Longest response-body excerpt kept in an error message.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// [`ChunkSource`] backed by the backend cache API.
#[derive(Debug, Clone)]
pub struct HttpChunkSource {
    http: reqwest::Client,
    base_url: String,
    project: String,
}

impl HttpChunkSource {
    /// Create a client for `base_url`/`project` with a per-request timeout.
    pub fn new(
        base_url: impl Into<String>,
        project: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let base_url: String = base_url.into();
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            project: project.into(),
        })
    }

    pub fn from_config(config: &CacheConfig) -> anyhow::Result<Self> {
        Self::new(
            config.base_url.clone(),
            config.project.clone(),
            config.request_timeout(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `path` with `query` and decode the JSON body as `T`.
    ///
    /// `label` names the requested resource in `NotFound` errors.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        label: &str,
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, resource = label, "backend request");

        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| FetchError::Network(transport_message(&e)))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = retry_after_ms(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, retry_after_ms, &body, label));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Network(transport_message(&e)))?;
        serde_json::from_str(&body).map_err(|e| FetchError::Decode(format!("{label}: {e}")))
    }
}

impl ChunkSource for HttpChunkSource {
    async fn fetch_chunk(&self, table: &str, index: u32) -> Result<Vec<Record>, FetchError> {
        let key = ChunkKey::new(table, index);
        let backend_key = key.backend_key();
        let body: ChunkBody = self
            .get_json(
                "/cache/data",
                &[
                    ("project", self.project.as_str()),
                    ("table", table),
                    ("key", backend_key.as_str()),
                ],
                &key.to_string(),
            )
            .await?;
        Ok(body.into_records())
    }

    async fn fetch_count(&self, table: &str) -> Result<usize, FetchError> {
        let body: CountBody = self
            .get_json(
                "/cache/count",
                &[("project", self.project.as_str()), ("table", table)],
                table,
            )
            .await?;
        Ok(body.count)
    }

    async fn list_chunks(&self, table: &str) -> Result<Vec<u32>, FetchError> {
        let body: KeysBody = self
            .get_json(
                "/cache/data",
                &[("project", self.project.as_str()), ("table", table)],
                table,
            )
            .await?;
        Ok(body.chunk_indices())
    }
}

/// Map a non-success status to a [`FetchError`].
fn map_status(
    status: StatusCode,
    retry_after_ms: Option<u64>,
    body: &str,
    label: &str,
) -> FetchError {
    let message = excerpt(body);
    match status.as_u16() {
        404 => FetchError::NotFound {
            key: label.to_string(),
        },
        401 | 403 => FetchError::Unauthorized,
        429 => FetchError::RateLimited { retry_after_ms },
        code @ 500..=599 => FetchError::Server {
            status: code,
            message,
        },
        code => FetchError::Http {
            status: code,
            message,
        },
    }
}

/// `Retry-After` in delta-seconds form, as milliseconds.
fn retry_after_ms(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| secs.saturating_mul(1000))
}

fn transport_message(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("request timed out: {error}")
    } else if error.is_connect() {
        format!("connection failed: {error}")
    } else {
        error.to_string()
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() > MAX_ERROR_BODY_CHARS {
        let cut: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{cut}...")
    } else {
        trimmed.to_string()
    }
}
