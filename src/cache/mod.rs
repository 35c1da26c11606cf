//! # Tiered Lookup Cache
//!
//! Two cache levels in front of the relational lookup:
//!
//! - **Local**: bounded in-process LRU with lazy TTL expiry ([`LocalCache`])
//! - **Remote**: shared Redis tier that degrades to neutral answers when
//!   unreachable ([`RedisCache`], [`NullRemoteCache`])
//!
//! [`CacheCoordinator`] composes them with a fixed policy: read local, then
//! remote (copying remote hits into local); write local, then remote.
//!
//! ## Example
//!
//! ```no_run
//! use citycode_core::cache::{cache_key, CacheConfig, CacheCoordinator, RedisCache};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> citycode_core::Result<()> {
//! let remote = Arc::new(RedisCache::with_url("redis://localhost:6379/0")?);
//! let cache = CacheCoordinator::new(CacheConfig::default(), remote, Duration::from_secs(600))?;
//! cache.initialize().await;
//!
//! let key = cache_key("city", "Paris");
//! if cache.get(&key).await.is_none() {
//!     cache.set(&key, "FR").await;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod entry;
pub mod local;
pub mod remote;
pub mod types;

pub use config::{CacheConfig, CacheConfigBuilder, RemoteCacheConfig, RemoteCacheConfigBuilder};
pub use coordinator::{cache_key, CacheCoordinator, CoordinatorStats};
pub use entry::CacheEntry;
pub use local::LocalCache;
pub use remote::{NullRemoteCache, RedisCache, RemoteCache};
pub use types::{CacheKey, CacheTier, CacheValue, EntrySnapshot, LocalCacheStats};
