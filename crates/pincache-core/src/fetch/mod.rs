//! Fetching from the backend: the source port and the retry loop, plus an
//! in-memory source for tests (`test-util` feature).

#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod retry;
pub mod source;
