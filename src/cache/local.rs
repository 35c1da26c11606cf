//! Bounded in-process cache with LRU eviction and lazy TTL expiry

use crate::cache::{
    config::CacheConfig,
    entry::CacheEntry,
    types::{CacheKey, CacheValue, EntrySnapshot, LocalCacheStats},
};
use crate::counters::{CacheCounters, CacheCountersSnapshot};
use crate::error::Result;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Fixed-capacity, time-bounded key/value cache
///
/// Every operation, reads included, goes through one exclusive lock because a
/// read reorders the recency queue. Only in-memory work happens under the
/// lock. Counters and the current size live outside it so [`stats`] never
/// waits on a writer.
///
/// Expiry is lazy: an entry past its TTL stays in memory until its key is
/// read (or evicted), but it is never returned.
///
/// [`stats`]: LocalCache::stats
pub struct LocalCache {
    config: CacheConfig,

    /// Internal storage
    store: Mutex<LocalStore>,

    /// Mirrors `store.entries.len()` after every mutation
    len: AtomicUsize,

    counters: Arc<CacheCounters>,
}

/// Internal cache storage
struct LocalStore {
    /// Main storage: key -> entry
    entries: HashMap<CacheKey, CacheEntry>,

    /// Recency order: front is least recently used
    lru_queue: VecDeque<CacheKey>,
}

impl LocalStore {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.lru_queue.iter().position(|k| k == key) {
            if let Some(k) = self.lru_queue.remove(pos) {
                self.lru_queue.push_back(k);
            }
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.lru_queue.retain(|k| k != key);
        Some(entry)
    }
}

impl LocalCache {
    /// Create a new cache after validating `config`
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        info!(
            "Initializing local cache (max_size: {}, ttl: {:?})",
            config.max_size, config.ttl
        );

        Ok(Self {
            store: Mutex::new(LocalStore {
                entries: HashMap::with_capacity(config.max_size),
                lru_queue: VecDeque::with_capacity(config.max_size),
            }),
            config,
            len: AtomicUsize::new(0),
            counters: Arc::new(CacheCounters::default()),
        })
    }

    /// Get a live value, promoting it to most recently used
    ///
    /// Counts exactly one hit or one miss. An expired entry is removed,
    /// counted as an expiration, and reported as a miss.
    pub async fn get(&self, key: &str) -> Option<CacheValue> {
        let mut store = self.store.lock().await;

        let expired = match store.entries.get(key) {
            None => {
                self.counters.record_miss();
                debug!("Cache MISS for key: {}", key);
                return None;
            }
            Some(entry) => entry.is_expired(self.config.ttl),
        };

        if expired {
            store.remove(key);
            self.len.store(store.entries.len(), Ordering::Release);
            self.counters.record_expiration();
            self.counters.record_miss();
            debug!("Cache EXPIRED for key: {}", key);
            return None;
        }

        let value = match store.entries.get_mut(key) {
            Some(entry) => {
                entry.mark_accessed();
                entry.value.clone()
            }
            None => return None,
        };
        store.touch(key);
        self.counters.record_hit();

        debug!("Cache HIT for key: {}", key);
        Some(value)
    }

    /// Insert or refresh a value
    ///
    /// Refreshing an existing key restarts its TTL and promotes it without
    /// evicting anything. A new key arriving at capacity first evicts the
    /// least recently used entry.
    pub async fn set(&self, key: impl Into<CacheKey>, value: impl Into<CacheValue>) {
        let key = key.into();
        let value = value.into();
        let mut store = self.store.lock().await;

        if let Some(existing) = store.entries.get_mut(&key) {
            existing.refresh(value);
            store.touch(&key);
            debug!("Cache UPDATE for key: {}", key);
            return;
        }

        if store.entries.len() >= self.config.max_size {
            if let Some(oldest) = store.lru_queue.pop_front() {
                store.entries.remove(&oldest);
                self.counters.record_eviction();
                debug!("Cache EVICTION: {} (LRU)", oldest);
            }
        }

        store.entries.insert(key.clone(), CacheEntry::new(value));
        store.lru_queue.push_back(key.clone());
        self.len.store(store.entries.len(), Ordering::Release);
        debug!("Cache SET for key: {}", key);
    }

    /// Remove a key, reporting whether it was present
    pub async fn delete(&self, key: &str) -> bool {
        let mut store = self.store.lock().await;

        let removed = store.remove(key).is_some();
        if removed {
            self.len.store(store.entries.len(), Ordering::Release);
            debug!("Cache DELETE for key: {}", key);
        }
        removed
    }

    /// Drop every entry and zero all counters
    pub async fn clear(&self) {
        let mut store = self.store.lock().await;

        let count = store.entries.len();
        store.entries.clear();
        store.lru_queue.clear();
        self.counters.reset();
        self.len.store(0, Ordering::Release);

        info!("Local cache cleared ({} entries)", count);
    }

    /// Current statistics; does not take the lock
    pub fn stats(&self) -> LocalCacheStats {
        let CacheCountersSnapshot {
            hits,
            misses,
            evictions,
            expirations,
        } = self.counters.snapshot();

        LocalCacheStats {
            current_size: self.len(),
            max_size: self.config.max_size,
            ttl: self.config.ttl,
            hits,
            misses,
            evictions,
            expirations,
        }
    }

    /// Live entries in LRU-to-MRU order
    ///
    /// Diagnostic only: nothing is promoted, counted, or expired.
    pub async fn snapshot(&self) -> Vec<EntrySnapshot> {
        let store = self.store.lock().await;
        let ttl = self.config.ttl;

        store
            .lru_queue
            .iter()
            .filter_map(|key| {
                let entry = store.entries.get(key)?;
                if entry.is_expired(ttl) {
                    return None;
                }
                Some(EntrySnapshot {
                    key: key.clone(),
                    value: entry.value.clone(),
                    age: entry.age(),
                    access_count: entry.access_count,
                    expires_in: entry.expires_in(ttl),
                })
            })
            .collect()
    }

    /// Number of entries held, including expired ones not yet touched
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_size(&self) -> usize {
        self.config.max_size
    }

    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }
}
