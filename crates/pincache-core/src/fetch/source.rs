//! Chunk source trait.
//!
//! Defines the interface to the backend cache API that holds tables as
//! numbered chunks. The HTTP implementation lives in pincache-infra; an
//! in-process one is available under the `test-util` feature.

use pincache_types::chunk::Record;
use pincache_types::error::FetchError;

/// Trait for a remote store of chunked tables.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
/// Implementations perform a single attempt per call; retrying and caching
/// are layered on top by [`crate::cache::chunked::ChunkedCache`].
pub trait ChunkSource: Send + Sync + 'static {
    /// Fetch the records of chunk `index` of `table`.
    ///
    /// Returns `FetchError::NotFound` if the chunk does not exist.
    fn fetch_chunk(
        &self,
        table: &str,
        index: u32,
    ) -> impl std::future::Future<Output = Result<Vec<Record>, FetchError>> + Send;

    /// Fetch the total number of records in `table`.
    fn fetch_count(
        &self,
        table: &str,
    ) -> impl std::future::Future<Output = Result<usize, FetchError>> + Send;

    /// List the chunk indices currently stored for `table`, ascending and
    /// without duplicates.
    fn list_chunks(
        &self,
        table: &str,
    ) -> impl std::future::Future<Output = Result<Vec<u32>, FetchError>> + Send;
}
