//! Chunk and record types.
//!
//! The backend cache API stores each table as a sequence of fixed-size
//! chunks, addressed by the key string `chunk:{index}`. A chunk's payload is
//! a JSON array of records; records are free-form JSON objects (pins, boards,
//! products, orders, design assets).

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A single record as returned by the backend.
pub type Record = serde_json::Value;

/// Shared, immutable chunk payload handed out to every caller.
pub type ChunkData = Arc<Vec<Record>>;

/// Prefix of backend chunk keys.
pub const CHUNK_KEY_PREFIX: &str = "chunk:";

/// Identifies one chunk of one backend table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkKey {
    pub table: String,
    pub index: u32,
}

impl ChunkKey {
    pub fn new(table: impl Into<String>, index: u32) -> Self {
        Self {
            table: table.into(),
            index,
        }
    }

    /// The key string the backend uses for this chunk (`chunk:{index}`).
    pub fn backend_key(&self) -> String {
        format!("{CHUNK_KEY_PREFIX}{}", self.index)
    }

    /// Parse a backend key such as `chunk:12` into its index.
    ///
    /// Returns `None` for keys that are not chunk keys (e.g. `count`,
    /// `meta`, `chunk:abc`).
    pub fn parse_backend_key(key: &str) -> Option<u32> {
        key.strip_prefix(CHUNK_KEY_PREFIX)?.parse().ok()
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}{}", self.table, CHUNK_KEY_PREFIX, self.index)
    }
}

/// Identity of a record: its `id` field, falling back to `_id`.
///
/// Numeric ids are rendered as their decimal string.
pub fn record_id(record: &Record) -> Option<String> {
    let raw = record.get("id").or_else(|| record.get("_id"))?;
    match raw {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Outcome of loading every chunk of a dataset.
///
/// Records are concatenated in chunk-index order. Chunks that could not be
/// fetched are listed in `failed` instead of aborting the whole load.
#[derive(Debug, Clone, Default)]
pub struct LoadedDataset {
    pub records: Vec<Record>,
    pub chunks_loaded: usize,
    pub failed: Vec<(u32, crate::error::FetchError)>,
}

impl LoadedDataset {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
