//! Dataset endpoints.
//!
//! - GET  /api/v1/datasets
//! - GET  /api/v1/datasets/{name}/count
//! - GET  /api/v1/datasets/{name}/chunks/{index}
//! - GET  /api/v1/datasets/{name}/records
//! - GET  /api/v1/datasets/{name}/stats
//! - POST /api/v1/datasets/{name}/invalidate

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use serde::Serialize;

use pincache_core::cache::chunked::ChunkedCache;
use pincache_core::fetch::source::ChunkSource;
use pincache_core::records::query::Page;
use pincache_types::chunk::Record;
use pincache_types::stats::CacheStats;

use crate::http::error::{AppError, RequestError};
use crate::http::extractors::query::RecordsQuery;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct DatasetSummary {
    pub name: String,
    pub table: String,
    pub chunk_ttl_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub dataset: String,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ChunkResponse {
    pub dataset: String,
    pub index: u32,
    pub records: Vec<Record>,
}

#[derive(Debug, Serialize)]
pub struct RecordsResponse {
    pub dataset: String,
    #[serde(flatten)]
    pub page: Page,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub dataset: String,
    #[serde(flatten)]
    pub stats: CacheStats,
    pub hit_ratio: Option<f64>,
    /// Whether the assembled record set is cached.
    pub records_cached: bool,
    pub records_age_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub dataset: String,
    pub invalidated: bool,
}

fn lookup<'a, S: ChunkSource>(
    state: &'a AppState<S>,
    name: &str,
) -> Result<&'a ChunkedCache<S>, AppError> {
    state
        .registry
        .get(name)
        .ok_or_else(|| AppError::DatasetNotFound {
            name: name.to_string(),
            known: state.registry.names().iter().map(|n| n.to_string()).collect(),
        })
}

/// GET /api/v1/datasets - Configured datasets.
pub async fn list_datasets<S: ChunkSource>(
    State(state): State<AppState<S>>,
) -> ApiResponse<Vec<DatasetSummary>> {
    let timer = RequestTimer::start();
    let datasets = state
        .registry
        .datasets()
        .map(|d| DatasetSummary {
            name: d.name.clone(),
            table: d.table.clone(),
            chunk_ttl_secs: state.config.chunk_ttl_for(d).as_secs(),
        })
        .collect();
    timer.success(datasets)
}

/// GET /api/v1/datasets/{name}/count - Backend record count.
pub async fn get_count<S: ChunkSource>(
    State(state): State<AppState<S>>,
    Path(name): Path<String>,
) -> Result<ApiResponse<CountResponse>, RequestError> {
    let timer = RequestTimer::start();
    let result = async {
        let count = lookup(&state, &name)?.get_count().await?;
        Ok::<_, AppError>(CountResponse {
            dataset: name,
            count,
        })
    }
    .await;
    timer.finish(result)
}

/// GET /api/v1/datasets/{name}/chunks/{index} - One chunk of records.
pub async fn get_chunk<S: ChunkSource>(
    State(state): State<AppState<S>>,
    Path((name, index)): Path<(String, u32)>,
) -> Result<ApiResponse<ChunkResponse>, RequestError> {
    let timer = RequestTimer::start();
    let result = async {
        let chunk = lookup(&state, &name)?.get_chunk(index).await?;
        Ok::<_, AppError>(ChunkResponse {
            dataset: name,
            index,
            records: chunk.as_ref().clone(),
        })
    }
    .await;
    timer.finish(result)
}

/// GET /api/v1/datasets/{name}/records - Search, filter, sort and page the
/// full dataset.
///
/// An unknown dataset is reported before any query parameter problem.
pub async fn list_records<S: ChunkSource>(
    State(state): State<AppState<S>>,
    Path(name): Path<String>,
    query: Result<Query<RecordsQuery>, QueryRejection>,
) -> Result<ApiResponse<RecordsResponse>, RequestError> {
    let timer = RequestTimer::start();
    let result = async {
        lookup(&state, &name)?;
        let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;
        let query = query.into_record_query()?;

        let records = state.registry.load_records(&name).await?;
        let page = query.apply(&records);

        tracing::debug!(
            request_id = %timer.request_id,
            dataset = %name,
            total = page.total,
            page = page.page,
            "records served"
        );
        Ok::<_, AppError>(RecordsResponse {
            dataset: name,
            page,
        })
    }
    .await;
    timer.finish(result)
}

/// GET /api/v1/datasets/{name}/stats - Cache counters for one dataset.
pub async fn get_stats<S: ChunkSource>(
    State(state): State<AppState<S>>,
    Path(name): Path<String>,
) -> Result<ApiResponse<StatsResponse>, RequestError> {
    let timer = RequestTimer::start();
    let result = lookup(&state, &name).map(|cache| {
        let stats = cache.stats();
        let tabs = state.registry.tabs();
        StatsResponse {
            hit_ratio: stats.hit_ratio(),
            records_cached: tabs.is_fresh(&name),
            records_age_secs: tabs.age(&name).map(|age| age.as_secs()),
            stats,
            dataset: name.clone(),
        }
    });
    timer.finish(result)
}

/// POST /api/v1/datasets/{name}/invalidate - Drop everything cached for a
/// dataset.
pub async fn invalidate<S: ChunkSource>(
    State(state): State<AppState<S>>,
    Path(name): Path<String>,
) -> Result<ApiResponse<InvalidateResponse>, RequestError> {
    let timer = RequestTimer::start();
    let result = lookup(&state, &name).map(|_| {
        let invalidated = state.registry.invalidate(&name);
        tracing::info!(request_id = %timer.request_id, dataset = %name, "cache invalidated");
        InvalidateResponse {
            dataset: name.clone(),
            invalidated,
        }
    });
    timer.finish(result)
}
