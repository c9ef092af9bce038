//! Shared domain types for pincache.
//!
//! This crate contains the types used across the cache workspace: chunk keys
//! and records, cache configuration, statistics snapshots, and the error
//! enums returned by the backend and the config loader.
//!
//! Zero infrastructure dependencies -- only serde, serde_json, thiserror.

pub mod chunk;
pub mod config;
pub mod error;
pub mod stats;
