//! Infrastructure layer for pincache.
//!
//! Contains implementations of the ports defined in `pincache-core`: the
//! reqwest-based backend cache API client, plus config file loading and
//! data directory resolution.

pub mod config;
pub mod http;
