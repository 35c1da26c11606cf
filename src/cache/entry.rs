//! Cache entry bookkeeping for the local tier

use crate::cache::types::CacheValue;
use std::time::Duration;
use tokio::time::Instant;

/// A locally cached value with recency and expiry metadata
///
/// Timestamps are monotonic. `refreshed_at` starts equal to `inserted_at`
/// and moves forward every time the key is written again; TTL is measured
/// from it.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached value
    pub value: CacheValue,

    /// When the key was first inserted
    pub inserted_at: Instant,

    /// When the value was last written
    pub refreshed_at: Instant,

    /// Number of reads served from this entry
    pub access_count: u64,

    /// Last read or write
    pub last_accessed_at: Instant,
}

impl CacheEntry {
    /// Create a new entry stamped with the current instant
    pub fn new(value: CacheValue) -> Self {
        let now = Instant::now();

        Self {
            value,
            inserted_at: now,
            refreshed_at: now,
            access_count: 0,
            last_accessed_at: now,
        }
    }

    /// Check if the entry has outlived `ttl`
    ///
    /// An entry exactly `ttl` old is still alive.
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.age() > ttl
    }

    /// Time since the value was last written
    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.refreshed_at)
    }

    /// Remaining lifetime, zero once expired
    pub fn expires_in(&self, ttl: Duration) -> Duration {
        ttl.saturating_sub(self.age())
    }

    /// Mark the entry as read (updates access time and count)
    pub fn mark_accessed(&mut self) {
        self.access_count += 1;
        self.last_accessed_at = Instant::now();
    }

    /// Replace the value and restart its TTL
    pub fn refresh(&mut self, value: CacheValue) {
        let now = Instant::now();
        self.value = value;
        self.refreshed_at = now;
        self.last_accessed_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_cache_entry_creation() {
        let entry = CacheEntry::new("US".to_string());

        assert_eq!(entry.value, "US");
        assert_eq!(entry.access_count, 0);
        assert_eq!(entry.inserted_at, entry.refreshed_at);
        assert!(!entry.is_expired(Duration::from_secs(600)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expiration_boundary() {
        let entry = CacheEntry::new("FR".to_string());
        let ttl = Duration::from_secs(10);

        tokio::time::advance(ttl).await;
        assert!(!entry.is_expired(ttl));
        assert_eq!(entry.expires_in(ttl), Duration::ZERO);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(entry.is_expired(ttl));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_accessed() {
        let mut entry = CacheEntry::new("DE".to_string());
        let initial_time = entry.last_accessed_at;

        tokio::time::advance(Duration::from_millis(10)).await;
        entry.mark_accessed();

        assert_eq!(entry.access_count, 1);
        assert!(entry.last_accessed_at > initial_time);
        // reads never extend the lifetime
        assert_eq!(entry.refreshed_at, entry.inserted_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_restarts_ttl() {
        let mut entry = CacheEntry::new("old".to_string());
        let ttl = Duration::from_secs(5);

        tokio::time::advance(Duration::from_secs(4)).await;
        entry.refresh("new".to_string());
        tokio::time::advance(Duration::from_secs(4)).await;

        assert_eq!(entry.value, "new");
        assert!(!entry.is_expired(ttl));
        assert!(entry.refreshed_at > entry.inserted_at);
        assert_eq!(entry.expires_in(ttl), Duration::from_secs(1));
    }
}
