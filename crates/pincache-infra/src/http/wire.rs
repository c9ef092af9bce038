//! Response bodies of the backend cache API.

use serde::Deserialize;

use pincache_types::chunk::{ChunkKey, Record};

/// Body of `GET /cache/data?...&key=chunk:N`.
///
/// The backend wraps chunk records as `{"data": [...]}`; older tables
/// return the bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ChunkBody {
    Wrapped { data: Vec<Record> },
    Bare(Vec<Record>),
}

impl ChunkBody {
    pub(crate) fn into_records(self) -> Vec<Record> {
        match self {
            ChunkBody::Wrapped { data } => data,
            ChunkBody::Bare(records) => records,
        }
    }
}

/// Body of `GET /cache/data?...` without a key: the table's cache keys.
#[derive(Debug, Deserialize)]
pub(crate) struct KeysBody {
    pub keys: Vec<String>,
}

impl KeysBody {
    /// Chunk indices among the keys, ascending, without duplicates.
    pub(crate) fn chunk_indices(&self) -> Vec<u32> {
        let mut indices: Vec<u32> = self
            .keys
            .iter()
            .filter_map(|k| ChunkKey::parse_backend_key(k))
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

/// Body of `GET /cache/count?...`.
#[derive(Debug, Deserialize)]
pub(crate) struct CountBody {
    pub count: usize,
}
