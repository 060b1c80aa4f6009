//! Counters describing cache behaviour

use serde::{Deserialize, Serialize};
use std::fmt;

/// Statistics for cache performance monitoring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CacheStats {
    /// Total number of cache hits
    pub hits: u64,

    /// Total number of cache misses (including expired-on-read)
    pub misses: u64,

    /// Number of entries currently in cache
    pub entries: usize,

    /// Entries evicted to make room under the count bound
    pub evictions: u64,

    /// Entries removed because their TTL ran out
    pub expirations: u64,

    /// Entries removed by `clear` or the quota recovery prune
    pub invalidations: u64,

    /// Persistence writes that failed after recovery was attempted
    pub persist_failures: u64,
}

impl CacheStats {
    /// Calculate cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Total entries removed for any reason
    pub fn total_removals(&self) -> u64 {
        self.evictions + self.expirations + self.invalidations
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, entries: {}, evictions: {}, expirations: {}, persist_failures: {} }}",
            self.hits,
            self.misses,
            self.hit_rate(),
            self.entries,
            self.evictions,
            self.expirations,
            self.persist_failures
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert_eq!(stats.hit_rate(), 80.0);
    }

    #[test]
    fn test_cache_stats_zero_requests() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
        assert_eq!(stats.total_removals(), 0);
    }

    #[test]
    fn test_cache_stats_display() {
        let stats = CacheStats {
            hits: 100,
            misses: 50,
            entries: 75,
            evictions: 10,
            expirations: 5,
            invalidations: 3,
            persist_failures: 1,
        };

        let display = format!("{}", stats);
        assert!(display.contains("hits: 100"));
        assert!(display.contains("hit_rate: 66.67%"));
        assert!(display.contains("persist_failures: 1"));
        assert_eq!(stats.total_removals(), 18);
    }
}
