//! Process-lifetime counters shared across the hot path
//!
//! All counters are plain atomics. Readers take a [`snapshot`] at any time
//! without holding a lock, so a writer is never delayed by more than its own
//! increment. Values in a snapshot are each exact but not taken at a single
//! instant relative to one another.
//!
//! [`snapshot`]: CacheCounters::snapshot

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Hit/miss/eviction/expiration counters owned by one local cache
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

/// Copy of [`CacheCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheCountersSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheCounters {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero every counter
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.expirations.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheCountersSnapshot {
        CacheCountersSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}

/// Request totals reported alongside every request-outcome event
#[derive(Debug, Default)]
pub struct RequestCounters {
    total_requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

/// Running totals as seen right after one request was counted
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningTotals {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_percentage: f64,
}

impl RunningTotals {
    fn new(total_requests: u64, cache_hits: u64, cache_misses: u64) -> Self {
        let cache_hit_percentage = if total_requests == 0 {
            0.0
        } else {
            let pct = cache_hits as f64 / total_requests as f64 * 100.0;
            (pct * 100.0).round() / 100.0
        };

        Self {
            total_requests,
            cache_hits,
            cache_misses,
            cache_hit_percentage,
        }
    }
}

impl RequestCounters {
    /// Count one request and return the totals including it
    pub fn record(&self, cache_hit: bool) -> RunningTotals {
        let total = self.total_requests.fetch_add(1, Ordering::Relaxed) + 1;
        let (hits, misses) = if cache_hit {
            (
                self.cache_hits.fetch_add(1, Ordering::Relaxed) + 1,
                self.cache_misses.load(Ordering::Relaxed),
            )
        } else {
            (
                self.cache_hits.load(Ordering::Relaxed),
                self.cache_misses.fetch_add(1, Ordering::Relaxed) + 1,
            )
        };

        RunningTotals::new(total, hits, misses)
    }

    pub fn snapshot(&self) -> RunningTotals {
        RunningTotals::new(
            self.total_requests.load(Ordering::Relaxed),
            self.cache_hits.load(Ordering::Relaxed),
            self.cache_misses.load(Ordering::Relaxed),
        )
    }

    pub fn reset(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
    }
}
