//! Service-wide configuration loaded from the environment
//!
//! `.env` is read first (if present), then every recognized variable
//! overrides the matching default. Unset variables keep their defaults;
//! unparsable values are configuration errors.

use crate::cache::{CacheConfig, RemoteCacheConfig};
use crate::error::{CoreError, Result};
use crate::telemetry::TelemetryConfig;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Level used when `RUST_LOG` is not set
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Everything the cache coordinator and emitter need
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub cache: CacheConfig,
    pub remote: RemoteCacheConfig,
    pub telemetry: TelemetryConfig,
    pub log: LogConfig,
}

impl ServiceConfig {
    /// Load `.env` and read configuration from the process environment
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(max_size) = parse::<usize>(&lookup, "CACHE_MAX_SIZE")? {
            config.cache.max_size = max_size;
        }
        if let Some(secs) = parse::<u64>(&lookup, "CACHE_TTL")? {
            config.cache.ttl = Duration::from_secs(secs);
        }
        // remote entries live as long as local ones
        config.remote.default_ttl = config.cache.ttl;

        if let Some(url) = lookup("REDIS_URL") {
            config.remote.url = url;
        }
        if let Some(max) = parse::<usize>(&lookup, "REDIS_MAX_CONNECTIONS")? {
            config.remote.max_connections = max;
        }
        if let Some(secs) = parse::<u64>(&lookup, "REDIS_TIMEOUT_SECS")? {
            let timeout = Duration::from_secs(secs);
            config.remote.wait_timeout = timeout;
            config.remote.connect_timeout = timeout;
            config.remote.operation_timeout = timeout;
        }

        if let Some(servers) = lookup("KAFKA_BOOTSTRAP_SERVERS") {
            config.telemetry.bootstrap_servers = servers
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(topic) = lookup("KAFKA_TOPIC") {
            config.telemetry.topic = topic;
        }
        if let Some(capacity) = parse::<usize>(&lookup, "TELEMETRY_QUEUE_CAPACITY")? {
            config.telemetry.queue_capacity = capacity;
        }
        if let Some(ms) = parse::<u64>(&lookup, "TELEMETRY_DELIVERY_TIMEOUT_MS")? {
            config.telemetry.delivery_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = parse::<u64>(&lookup, "KAFKA_RECONNECT_BACKOFF_SECS")? {
            config.telemetry.reconnect_backoff = Duration::from_secs(secs);
        }
        if let Some(attempts) = parse::<u32>(&lookup, "KAFKA_MAX_RECONNECT_ATTEMPTS")? {
            config.telemetry.max_reconnect_attempts = attempts;
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log.level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;
        self.remote.validate()?;
        self.telemetry.validate()?;
        Ok(())
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            CoreError::ConfigError(format!("invalid value for {}: {:?} ({})", name, raw, e))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio_test::{assert_err, assert_ok};

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = assert_ok!(ServiceConfig::from_lookup(|_| None));

        assert_eq!(config.cache.max_size, 10);
        assert_eq!(config.cache.ttl, Duration::from_secs(600));
        assert_eq!(config.remote.url, "redis://redis:6379/0");
        assert_eq!(config.telemetry.topic, "city_service_logs");
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_overrides_from_environment() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            ("CACHE_MAX_SIZE", "25"),
            ("CACHE_TTL", "120"),
            ("REDIS_URL", "redis://cache:6380/2"),
            ("REDIS_TIMEOUT_SECS", "2"),
            ("KAFKA_BOOTSTRAP_SERVERS", "k1:9092,k2:9092"),
            ("KAFKA_TOPIC", "lookups"),
            ("TELEMETRY_QUEUE_CAPACITY", "50"),
            ("TELEMETRY_DELIVERY_TIMEOUT_MS", "750"),
            ("KAFKA_RECONNECT_BACKOFF_SECS", "1"),
            ("KAFKA_MAX_RECONNECT_ATTEMPTS", "7"),
            ("LOG_LEVEL", "DEBUG"),
        ]))
        .unwrap();

        assert_eq!(config.cache.max_size, 25);
        assert_eq!(config.cache.ttl, Duration::from_secs(120));
        assert_eq!(config.remote.default_ttl, Duration::from_secs(120));
        assert_eq!(config.remote.url, "redis://cache:6380/2");
        assert_eq!(config.remote.operation_timeout, Duration::from_secs(2));
        assert_eq!(config.telemetry.bootstrap_servers, vec!["k1:9092", "k2:9092"]);
        assert_eq!(config.telemetry.topic, "lookups");
        assert_eq!(config.telemetry.queue_capacity, 50);
        assert_eq!(config.telemetry.delivery_timeout, Duration::from_millis(750));
        assert_eq!(config.telemetry.reconnect_backoff, Duration::from_secs(1));
        assert_eq!(config.telemetry.max_reconnect_attempts, 7);
        assert_eq!(config.log.level, "DEBUG");
    }

    #[test]
    fn test_unparsable_value_is_an_error() {
        let result = ServiceConfig::from_lookup(lookup_from(&[("CACHE_MAX_SIZE", "ten")]));
        match result {
            Err(CoreError::ConfigError(msg)) => assert!(msg.contains("CACHE_MAX_SIZE")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_value_fails_validation() {
        assert_err!(ServiceConfig::from_lookup(lookup_from(&[("CACHE_MAX_SIZE", "0")])));
        assert_err!(ServiceConfig::from_lookup(lookup_from(&[(
            "TELEMETRY_QUEUE_CAPACITY",
            "0"
        )])));
    }
}
