//! Core type definitions for the cache tiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Cache key type
pub type CacheKey = String;

/// Cache value type - opaque to the cache
pub type CacheValue = String;

/// Point-in-time statistics for the local tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalCacheStats {
    /// Entries currently held (expired-but-untouched entries included)
    pub current_size: usize,

    /// Capacity
    pub max_size: usize,

    /// Configured time-to-live
    pub ttl: Duration,

    /// Reads that returned a live value
    pub hits: u64,

    /// Reads that returned nothing, expired reads included
    pub misses: u64,

    /// Entries pushed out by capacity
    pub evictions: u64,

    /// Entries removed because they outlived the TTL
    pub expirations: u64,
}

impl LocalCacheStats {
    /// Total reads observed
    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }

    /// Fraction of reads that hit, 0.0 when there were no reads
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Hit rate as a percentage rounded to two decimals
    pub fn hit_percentage(&self) -> f64 {
        (self.hit_rate() * 10_000.0).round() / 100.0
    }

    /// Whether the cache holds as many entries as it can
    pub fn is_full(&self) -> bool {
        self.current_size >= self.max_size
    }
}

impl fmt::Display for LocalCacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LocalCacheStats {{ size: {}/{}, hits: {}, misses: {}, hit_rate: {:.2}%, evictions: {}, expirations: {} }}",
            self.current_size,
            self.max_size,
            self.hits,
            self.misses,
            self.hit_percentage(),
            self.evictions,
            self.expirations
        )
    }
}

/// Diagnostic view of one local entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub key: CacheKey,
    pub value: CacheValue,
    pub age: Duration,
    pub access_count: u64,
    pub expires_in: Duration,
}

/// Cache tier identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    /// In-process LRU
    Local,

    /// Shared Redis
    Remote,
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheTier::Local => write!(f, "local_lru"),
            CacheTier::Remote => write!(f, "redis_distributed"),
        }
    }
}
