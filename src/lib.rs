//! # citycode-core
//!
//! Core of the city → country-code lookup service: a two-tier lookup cache
//! and a best-effort telemetry emitter. HTTP handling and the relational
//! lookup itself live in the service that embeds this crate.
//!
//! ## Features
//!
//! - Bounded in-process LRU cache with lazy TTL expiry
//! - Shared Redis tier that degrades to local-only when unreachable
//! - Non-blocking telemetry recording with a bounded queue
//! - Single background delivery worker with reconnect backoff and a
//!   degraded mode when Kafka stays unreachable
//! - Environment-driven configuration and tracing setup
//!
//! ## Lookup with telemetry
//!
//! ```no_run
//! use citycode_core::{cache_key, CacheCoordinator, Emitter, RedisCache, ServiceConfig};
//! use std::sync::Arc;
//! use std::time::Instant;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServiceConfig::from_env()?;
//!     citycode_core::logging::init_logging(&config.log.level);
//!
//!     let remote = Arc::new(RedisCache::new(config.remote.clone())?);
//!     let cache = CacheCoordinator::new(config.cache.clone(), remote, config.remote.default_ttl)?;
//!     cache.initialize().await;
//!
//!     let emitter = Emitter::kafka(config.telemetry.clone())?;
//!
//!     let started = Instant::now();
//!     let key = cache_key("city", "Paris");
//!     let hit = cache.get(&key).await.is_some();
//!     if !hit {
//!         cache.set(&key, "FR").await;
//!     }
//!     emitter.record_request("Paris", started.elapsed(), hit, 200);
//!
//!     emitter.close().await?;
//!     cache.close().await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod counters;
pub mod error;
pub mod health;
pub mod logging;
pub mod telemetry;

// Re-export main types for convenience
pub use cache::{
    cache_key, CacheConfig, CacheConfigBuilder, CacheCoordinator, CoordinatorStats, LocalCache,
    LocalCacheStats, NullRemoteCache, RedisCache, RemoteCache, RemoteCacheConfig,
};
pub use config::{LogConfig, ServiceConfig};
pub use counters::{RequestCounters, RunningTotals};
pub use error::{CoreError, Result};
pub use health::{CacheHealth, HealthStatus, RemoteInfo, RemoteStatus};
pub use telemetry::{
    BrokerSink, ConnectionState, Emitter, EmitterMetrics, KafkaSink, TelemetryConfig,
    TelemetryEvent,
};
