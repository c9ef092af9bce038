//! Operations over loaded record sets: querying and export.

pub mod export;
pub mod query;
