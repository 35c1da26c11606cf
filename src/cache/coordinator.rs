//! Two-tier cache coordinator
//!
//! Reads go local first, then remote; a remote hit is copied into the local
//! tier only. Writes go local first, then remote on a best-effort basis. The
//! remote tier never decides whether a call succeeds: when it is down the
//! coordinator keeps serving from the local tier and reports itself degraded.

use crate::cache::{
    config::CacheConfig,
    local::LocalCache,
    remote::RemoteCache,
    types::{CacheTier, CacheValue, LocalCacheStats},
};
use crate::error::Result;
use crate::health::CacheHealth;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Build a normalized cache key, e.g. `city:new york`
pub fn cache_key(prefix: &str, identifier: &str) -> String {
    format!("{}:{}", prefix, identifier.to_lowercase())
}

/// Read/write API over the local and remote tiers
pub struct CacheCoordinator {
    local: LocalCache,
    remote: Arc<dyn RemoteCache>,
    remote_ttl: Duration,
    started_at: Instant,
    counters: TierCounters,
}

#[derive(Debug, Default)]
struct TierCounters {
    local_hits: AtomicU64,
    remote_hits: AtomicU64,
    misses: AtomicU64,
    remote_write_failures: AtomicU64,
}

/// Snapshot returned by [`CacheCoordinator::stats`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorStats {
    pub local: LocalCacheStats,
    pub remote_backend: String,
    pub remote_connected: bool,
    /// Always true: the local tier alone keeps the coordinator operable
    pub healthy: bool,
    pub uptime: Duration,
    pub strategy: String,
    pub tiers: Vec<CacheTier>,
    pub local_hits: u64,
    pub remote_hits: u64,
    pub misses: u64,
    pub remote_write_failures: u64,
}

impl CacheCoordinator {
    /// Compose a coordinator from a local config and any remote tier
    ///
    /// `remote_ttl` is the expiry sent with remote writes.
    pub fn new(
        config: CacheConfig,
        remote: Arc<dyn RemoteCache>,
        remote_ttl: Duration,
    ) -> Result<Self> {
        let local = LocalCache::new(config)?;

        Ok(Self {
            local,
            remote,
            remote_ttl,
            started_at: Instant::now(),
            counters: TierCounters::default(),
        })
    }

    /// Connect the remote tier. Failure only degrades the coordinator.
    pub async fn initialize(&self) {
        self.remote.connect().await;
        if self.remote.is_connected() {
            info!("Cache coordinator initialized (local + {})", self.remote.name());
        } else {
            warn!(
                "Cache coordinator initialized without remote tier ({} unavailable)",
                self.remote.name()
            );
        }
    }

    /// Clear the local tier and release the remote connection
    pub async fn close(&self) {
        self.local.clear().await;
        self.remote.disconnect().await;
        info!("Cache coordinator closed");
    }

    /// Look a key up, local tier first
    pub async fn get(&self, key: &str) -> Option<CacheValue> {
        if let Some(value) = self.local.get(key).await {
            self.counters.local_hits.fetch_add(1, Ordering::Relaxed);
            debug!("L1 cache HIT for key: {}", key);
            return Some(value);
        }

        if let Some(value) = self.remote.get(key).await {
            self.local.set(key, value.clone()).await;
            self.counters.remote_hits.fetch_add(1, Ordering::Relaxed);
            debug!("L2 cache HIT for key: {}, updating L1", key);
            return Some(value);
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Cache MISS for key: {}", key);
        None
    }

    /// Store a value in both tiers; only the local write is guaranteed
    pub async fn set(&self, key: &str, value: impl Into<CacheValue>) {
        let value = value.into();
        self.local.set(key, value.clone()).await;

        if !self.remote.set(key, &value, self.remote_ttl).await {
            self.counters
                .remote_write_failures
                .fetch_add(1, Ordering::Relaxed);
            debug!("Remote write skipped or failed for key: {}", key);
        }

        debug!("Cache SET for key: {} (both levels)", key);
    }

    /// Delete from both tiers; reports whether the local tier held the key
    pub async fn delete(&self, key: &str) -> bool {
        let was_local = self.local.delete(key).await;
        self.remote.delete(key).await;
        debug!("Cache DELETE for key: {} (both levels)", key);
        was_local
    }

    /// Clear both tiers
    pub async fn clear(&self) {
        self.local.clear().await;
        self.remote.clear().await;
        info!("Both cache levels cleared");
    }

    /// Read-through helper: serve from cache or run `loader` and cache its result
    ///
    /// `None` from the loader is not cached. Loader errors are returned as-is.
    pub async fn get_or_load<F, Fut, E>(
        &self,
        key: &str,
        loader: F,
    ) -> std::result::Result<Option<CacheValue>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<CacheValue>, E>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(Some(value));
        }

        let loaded = loader().await?;
        if let Some(value) = &loaded {
            self.set(key, value.clone()).await;
        }
        Ok(loaded)
    }

    /// Non-blocking statistics snapshot
    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            local: self.local.stats(),
            remote_backend: self.remote.name().to_string(),
            remote_connected: self.remote.is_connected(),
            healthy: true,
            uptime: self.started_at.elapsed(),
            strategy: "dual_level_lru".to_string(),
            tiers: vec![CacheTier::Local, CacheTier::Remote],
            local_hits: self.counters.local_hits.load(Ordering::Relaxed),
            remote_hits: self.counters.remote_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            remote_write_failures: self.counters.remote_write_failures.load(Ordering::Relaxed),
        }
    }

    /// Probe the remote tier; the result is `Healthy` or `Degraded`
    /// and carries the remote server's info
    pub async fn health(&self) -> CacheHealth {
        let remote_healthy = self.remote.health_check().await;
        let remote_info = self.remote.info().await;
        CacheHealth::new(remote_healthy, self.remote.name()).with_remote_info(remote_info)
    }

    /// Healthy whenever the coordinator exists
    pub fn is_healthy(&self) -> bool {
        true
    }

    pub fn local(&self) -> &LocalCache {
        &self.local
    }

    pub fn remote(&self) -> &Arc<dyn RemoteCache> {
        &self.remote
    }
}
