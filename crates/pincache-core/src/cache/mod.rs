//! Caching layers.
//!
//! - [`ttl`]: time-expiring concurrent map.
//! - [`coalesce`]: one in-flight fetch per key.
//! - [`generation`]: invalidation fencing for in-flight fetches.
//! - [`chunked`]: read-through cache over a table's chunks.
//! - [`tab`]: whole-dataset cache keyed by dashboard view.

pub mod chunked;
pub mod coalesce;
pub mod generation;
pub mod tab;
pub mod ttl;
