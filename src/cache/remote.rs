//! Shared remote cache tier
//!
//! The remote tier is optional infrastructure: every method here degrades to
//! a neutral answer (`None` / `false`) when the store is unreachable, slow, or
//! was never connected. Callers never see an error for "the remote tier is
//! down"; the failure is logged and reflected in [`RemoteCache::is_connected`].

use crate::cache::config::RemoteCacheConfig;
use crate::error::{CoreError, Result};
use crate::health::RemoteInfo;
use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Connection, Pool, Runtime};
use redis::AsyncCommands;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// A shared key/value tier behind the local cache
#[async_trait]
pub trait RemoteCache: Send + Sync {
    /// Establish the connection; failures leave the tier disconnected
    async fn connect(&self);

    /// Release the connection
    async fn disconnect(&self);

    /// Last known connectivity
    fn is_connected(&self) -> bool;

    /// Fetch a value; `None` on miss or on any failure
    async fn get(&self, key: &str) -> Option<String>;

    /// Store a value with an expiry; `false` on any failure
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> bool;

    /// Delete a key; `false` if absent or on any failure
    async fn delete(&self, key: &str) -> bool;

    /// Drop every key this tier owns: its prefix if it has one, otherwise
    /// the whole selected database
    async fn clear(&self) -> bool;

    /// Round-trip probe; a failed probe marks the tier disconnected
    async fn health_check(&self) -> bool;

    /// Server-side statistics for monitoring
    async fn info(&self) -> RemoteInfo;

    /// Short name for logs and stats
    fn name(&self) -> &str;
}

/// Keys scanned per SCAN round trip when clearing a prefix
const SCAN_BATCH_SIZE: usize = 100;

/// Redis-backed remote tier with a bounded connection pool
pub struct RedisCache {
    config: RemoteCacheConfig,

    /// Pool handle, present only between a successful connect and disconnect
    pool: RwLock<Option<Pool>>,

    connected: AtomicBool,
}

impl RedisCache {
    /// Create an unconnected adapter; call [`RemoteCache::connect`] to use it
    pub fn new(config: RemoteCacheConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            pool: RwLock::new(None),
            connected: AtomicBool::new(false),
        })
    }

    /// Create an adapter for `url` with default pool settings
    pub fn with_url(url: impl Into<String>) -> Result<Self> {
        Self::new(RemoteCacheConfig::builder().url(url).build())
    }

    pub fn config(&self) -> &RemoteCacheConfig {
        &self.config
    }

    fn build_pool(&self) -> Result<Pool> {
        let mut cfg = PoolConfig::from_url(self.config.url.clone());
        let mut pool_cfg = deadpool_redis::PoolConfig::new(self.config.max_connections);
        pool_cfg.timeouts.wait = Some(self.config.wait_timeout);
        pool_cfg.timeouts.create = Some(self.config.connect_timeout);
        pool_cfg.timeouts.recycle = Some(self.config.operation_timeout);
        cfg.pool = Some(pool_cfg);

        cfg.create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CoreError::PoolError(format!("Failed to create Redis pool: {}", e)))
    }

    fn prefix(&self) -> Option<&str> {
        self.config
            .key_prefix
            .as_deref()
            .filter(|prefix| !prefix.is_empty())
    }

    /// Build the full key with prefix
    fn build_key(&self, key: &str) -> String {
        match self.prefix() {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }

    /// Clone the pool handle out from under the lock
    async fn pool(&self) -> Result<Pool> {
        if !self.is_connected() {
            return Err(CoreError::NotConnected("redis".to_string()));
        }

        self.pool
            .read()
            .await
            .clone()
            .ok_or_else(|| CoreError::NotConnected("redis".to_string()))
    }

    async fn connection(pool: &Pool) -> Result<Connection> {
        pool.get()
            .await
            .map_err(|e| CoreError::PoolError(format!("Failed to get Redis connection: {}", e)))
    }

    /// Run one command against a pooled connection under the operation timeout
    async fn run<T, F, Fut>(&self, context: &str, op: F) -> Result<T>
    where
        F: FnOnce(Connection) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        let pool = self.pool().await?;
        let timeout = self.config.operation_timeout;

        let work = async {
            let conn = Self::connection(&pool).await?;
            op(conn).await.map_err(CoreError::from)
        };

        match tokio::time::timeout(timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::timeout(timeout, format!("redis {}", context))),
        }
    }

    async fn ping(&self, pool: &Pool) -> Result<()> {
        let timeout = self.config.operation_timeout;

        let work = async {
            let mut conn = Self::connection(pool).await?;
            let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
            if reply == "PONG" {
                Ok(())
            } else {
                Err(CoreError::ConnectionError(format!(
                    "unexpected PING reply: {}",
                    reply
                )))
            }
        };

        match tokio::time::timeout(timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::timeout(timeout, "redis ping")),
        }
    }
}

#[async_trait]
impl RemoteCache for RedisCache {
    async fn connect(&self) {
        let pool = match self.build_pool() {
            Ok(pool) => pool,
            Err(e) => {
                error!("Redis connection failed: {}", e);
                self.connected.store(false, Ordering::Release);
                return;
            }
        };

        match self.ping(&pool).await {
            Ok(()) => {
                *self.pool.write().await = Some(pool);
                self.connected.store(true, Ordering::Release);
                info!("Redis connection established ({})", self.config.url);
            }
            Err(e) => {
                error!("Redis connection failed: {}", e);
                pool.close();
                self.connected.store(false, Ordering::Release);
            }
        }
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        if let Some(pool) = self.pool.write().await.take() {
            pool.close();
            info!("Redis connection closed");
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn get(&self, key: &str) -> Option<String> {
        if !self.is_connected() {
            return None;
        }

        let full_key = self.build_key(key);
        let result = self
            .run("GET", |mut conn| async move {
                conn.get::<_, Option<String>>(full_key).await
            })
            .await;

        match result {
            Ok(Some(value)) => {
                debug!("Redis HIT for key: {}", key);
                Some(value)
            }
            Ok(None) => {
                debug!("Redis MISS for key: {}", key);
                None
            }
            Err(e) => {
                error!("Redis get error for key {}: {}", key, e);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> bool {
        if !self.is_connected() {
            return false;
        }

        let full_key = self.build_key(key);
        let value = value.to_string();
        let seconds = ttl.as_secs().max(1);
        let result = self
            .run("SET", |mut conn| async move {
                conn.set_ex::<_, _, ()>(full_key, value, seconds).await
            })
            .await;

        match result {
            Ok(()) => {
                debug!("Redis SET for key: {}", key);
                true
            }
            Err(e) => {
                error!("Redis set error for key {}: {}", key, e);
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        if !self.is_connected() {
            return false;
        }

        let full_key = self.build_key(key);
        let result = self
            .run("DEL", |mut conn| async move { conn.del::<_, i64>(full_key).await })
            .await;

        match result {
            Ok(count) => {
                if count > 0 {
                    debug!("Redis DELETE for key: {}", key);
                }
                count > 0
            }
            Err(e) => {
                error!("Redis delete error for key {}: {}", key, e);
                false
            }
        }
    }

    async fn clear(&self) -> bool {
        if !self.is_connected() {
            return false;
        }

        let result = match self.prefix() {
            None => {
                self.run("FLUSHDB", |mut conn| async move {
                    redis::cmd("FLUSHDB").query_async::<()>(&mut conn).await
                })
                .await
            }
            Some(prefix) => {
                // SCAN + UNLINK so other tenants of the database keep their keys
                let pattern = format!("{}:*", prefix);
                self.run("SCAN/UNLINK", |mut conn| async move {
                    let mut cursor: u64 = 0;
                    loop {
                        let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                            .arg(cursor)
                            .arg("MATCH")
                            .arg(&pattern)
                            .arg("COUNT")
                            .arg(SCAN_BATCH_SIZE)
                            .query_async(&mut conn)
                            .await?;

                        if !keys.is_empty() {
                            redis::cmd("UNLINK")
                                .arg(&keys)
                                .query_async::<()>(&mut conn)
                                .await?;
                        }

                        cursor = next_cursor;
                        if cursor == 0 {
                            return Ok::<(), redis::RedisError>(());
                        }
                    }
                })
                .await
            }
        };

        match result {
            Ok(()) => {
                info!("Redis cache cleared (prefix: {:?})", self.prefix());
                true
            }
            Err(e) => {
                error!("Redis clear error: {}", e);
                false
            }
        }
    }

    async fn health_check(&self) -> bool {
        let pool = match self.pool().await {
            Ok(pool) => pool,
            Err(_) => return false,
        };

        match self.ping(&pool).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Redis health check failed: {}", e);
                self.connected.store(false, Ordering::Release);
                false
            }
        }
    }

    async fn info(&self) -> RemoteInfo {
        if !self.is_connected() {
            return RemoteInfo::disconnected();
        }

        let result = self
            .run("INFO", |mut conn| async move {
                redis::cmd("INFO").query_async::<String>(&mut conn).await
            })
            .await;

        match result {
            Ok(text) => RemoteInfo::from_redis_info(&text),
            Err(e) => {
                error!("Redis info error: {}", e);
                RemoteInfo::error(e.to_string())
            }
        }
    }

    fn name(&self) -> &str {
        "redis"
    }
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("url", &self.config.url)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Remote tier for local-only deployments; never connects
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRemoteCache;

#[async_trait]
impl RemoteCache for NullRemoteCache {
    async fn connect(&self) {
        debug!("Null remote cache: connect is a no-op");
    }

    async fn disconnect(&self) {}

    fn is_connected(&self) -> bool {
        false
    }

    async fn get(&self, _key: &str) -> Option<String> {
        None
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> bool {
        false
    }

    async fn delete(&self, _key: &str) -> bool {
        false
    }

    async fn clear(&self) -> bool {
        false
    }

    async fn health_check(&self) -> bool {
        false
    }

    async fn info(&self) -> RemoteInfo {
        RemoteInfo::disconnected()
    }

    fn name(&self) -> &str {
        "null"
    }
}
