//! HTTP gateway for the chunk caches.
//!
//! Axum-based read API at `/api/v1/` with an envelope response format and
//! CORS support. Every dataset is served from its in-process cache.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod response;
pub mod router;
