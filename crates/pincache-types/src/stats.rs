//! Cache statistics snapshot.

use serde::{Deserialize, Serialize};

/// Point-in-time counters for one chunked cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups served from a fresh cache entry.
    pub hits: u64,
    /// Lookups that had to go to the backend (or join an in-flight fetch).
    pub misses: u64,
    /// Callers that joined an already in-flight fetch instead of starting one.
    pub coalesced: u64,
    /// Fetches actually started against the backend.
    pub fetches: u64,
    /// Fetches that ended in an error after all retries.
    pub failures: u64,
    /// Extra attempts made by the retry loop.
    pub retries: u64,
    /// Chunk entries currently held (fresh or not yet purged).
    pub entries: usize,
    /// Entries dropped because their TTL had elapsed.
    pub expired_evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups served from cache, or `None` before any lookup.
    pub fn hit_ratio(&self) -> Option<f64> {
        let total = self.hits + self.misses;
        if total == 0 {
            None
        } else {
            Some(self.hits as f64 / total as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_ratio() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_ratio(), None);

        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        let ratio = stats.hit_ratio().unwrap();
        assert!((ratio - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stats_serialize() {
        let stats = CacheStats {
            hits: 1,
            entries: 2,
            ..Default::default()
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"hits\":1"));
        assert!(json.contains("\"entries\":2"));
    }
}
