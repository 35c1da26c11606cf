//! Configuration for the local and remote cache tiers

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the bounded local cache
///
/// Defaults match the lookup service: ten entries, ten minutes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries held in process
    pub max_size: usize,

    /// Time-to-live measured from the last insert or update of a key
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            // 10 minutes
            ttl: Duration::from_secs(600),
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(CoreError::ConfigError(
                "cache max_size must be greater than 0".to_string(),
            ));
        }

        if self.ttl.is_zero() {
            return Err(CoreError::ConfigError(
                "cache ttl must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Configuration for memory-constrained deployments
    pub fn small() -> Self {
        Self {
            max_size: 10,
            ttl: Duration::from_secs(300),
        }
    }

    /// Configuration for instances serving a wide key space
    pub fn large() -> Self {
        Self {
            max_size: 1_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Builder for local cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    max_size: Option<usize>,
    ttl: Option<Duration>,
}

impl CacheConfigBuilder {
    /// Set maximum number of cache entries
    pub fn max_size(mut self, max: usize) -> Self {
        self.max_size = Some(max);
        self
    }

    /// Set time-to-live for cache entries
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            max_size: self.max_size.unwrap_or(defaults.max_size),
            ttl: self.ttl.unwrap_or(defaults.ttl),
        }
    }
}

/// Configuration for the shared Redis tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCacheConfig {
    /// Redis connection URL
    pub url: String,

    /// Maximum pooled connections
    pub max_connections: usize,

    /// Bound on waiting for a free pooled connection
    pub wait_timeout: Duration,

    /// Bound on establishing a new connection
    pub connect_timeout: Duration,

    /// Bound on any single command round-trip
    pub operation_timeout: Duration,

    /// TTL sent with `SET ... EX`
    pub default_ttl: Duration,

    /// Optional namespace prepended as `prefix:key`
    pub key_prefix: Option<String>,
}

impl Default for RemoteCacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://redis:6379/0".to_string(),
            max_connections: 20,
            wait_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(5),
            default_ttl: Duration::from_secs(600),
            key_prefix: None,
        }
    }
}

impl RemoteCacheConfig {
    /// Create a new builder for remote cache configuration
    pub fn builder() -> RemoteCacheConfigBuilder {
        RemoteCacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(CoreError::ConfigError("redis url must not be empty".to_string()));
        }

        if self.max_connections == 0 {
            return Err(CoreError::ConfigError(
                "redis max_connections must be greater than 0".to_string(),
            ));
        }

        if self.operation_timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(CoreError::ConfigError(
                "redis timeouts must be greater than 0".to_string(),
            ));
        }

        // SET EX takes whole seconds
        if self.default_ttl.as_secs() == 0 {
            return Err(CoreError::ConfigError(
                "redis default_ttl must be at least one second".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for remote cache configuration
#[derive(Debug, Default)]
pub struct RemoteCacheConfigBuilder {
    url: Option<String>,
    max_connections: Option<usize>,
    wait_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    operation_timeout: Option<Duration>,
    default_ttl: Option<Duration>,
    key_prefix: Option<String>,
}

impl RemoteCacheConfigBuilder {
    /// Set the Redis connection URL
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the pool size
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Set the bound on waiting for a pooled connection
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    /// Set the bound on opening a connection
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the bound on a single command
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Set the TTL used for remote writes
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Set a key namespace
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Build the remote cache configuration
    pub fn build(self) -> RemoteCacheConfig {
        let defaults = RemoteCacheConfig::default();

        RemoteCacheConfig {
            url: self.url.unwrap_or(defaults.url),
            max_connections: self.max_connections.unwrap_or(defaults.max_connections),
            wait_timeout: self.wait_timeout.unwrap_or(defaults.wait_timeout),
            connect_timeout: self.connect_timeout.unwrap_or(defaults.connect_timeout),
            operation_timeout: self.operation_timeout.unwrap_or(defaults.operation_timeout),
            default_ttl: self.default_ttl.unwrap_or(defaults.default_ttl),
            key_prefix: self.key_prefix.or(defaults.key_prefix),
        }
    }
}
