//! Axum router configuration with middleware.
//!
//! All dataset routes are under `/api/v1/`.
//! Middleware: CORS, tracing, gzip compression.

use axum::Router;
use axum::routing::{get, post};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use pincache_core::fetch::source::ChunkSource;

use crate::http::handlers;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// Build the complete gateway router with all routes and middleware.
pub fn build_router<S: ChunkSource>(state: AppState<S>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/datasets", get(handlers::dataset::list_datasets::<S>))
        .route("/datasets/{name}/count", get(handlers::dataset::get_count::<S>))
        .route(
            "/datasets/{name}/chunks/{index}",
            get(handlers::dataset::get_chunk::<S>),
        )
        .route(
            "/datasets/{name}/records",
            get(handlers::dataset::list_records::<S>),
        )
        .route("/datasets/{name}/stats", get(handlers::dataset::get_stats::<S>))
        .route(
            "/datasets/{name}/invalidate",
            post(handlers::dataset::invalidate::<S>),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint, in the same envelope as the
/// API routes.
async fn health_check() -> ApiResponse<serde_json::Value> {
    RequestTimer::start().success(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
