//! Cache engine and port trait definitions for pincache.
//!
//! This crate defines the `ChunkSource` port that the infrastructure layer
//! implements, plus everything that sits on top of it: the TTL cache, the
//! in-flight fetch coalescer, the retry loop, and the chunked read-through
//! cache. It depends only on `pincache-types` -- never on `pincache-infra`
//! or any HTTP/IO crate.

pub mod cache;
pub mod clock;
pub mod fetch;
pub mod records;
pub mod registry;
