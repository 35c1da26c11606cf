//! Emitter configuration

use crate::error::{CoreError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the telemetry emitter and its broker connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Broker bootstrap addresses, `host:port`
    pub bootstrap_servers: Vec<String>,

    /// Default topic for [`crate::telemetry::Emitter::record`]
    pub topic: String,

    /// Partition written to
    pub partition: i32,

    /// Events buffered before `record` starts dropping
    pub queue_capacity: usize,

    /// Bound on one send attempt
    pub delivery_timeout: Duration,

    /// Bound on one connect attempt
    pub connect_timeout: Duration,

    /// Pause between reconnect attempts
    pub reconnect_backoff: Duration,

    /// Consecutive failed connects before settling into degraded mode
    pub max_reconnect_attempts: u32,

    /// Send attempts per event before it is dropped
    pub max_delivery_attempts: u32,

    /// Probe interval while degraded; `None` stays degraded until shutdown
    pub degraded_retry_interval: Option<Duration>,

    /// Probe interval while connected and idle
    pub health_check_interval: Duration,

    /// Bound on `close()` waiting for the worker
    pub shutdown_timeout: Duration,

    /// Fraction of `reconnect_backoff` added or removed at random (0.0..=1.0)
    pub backoff_jitter: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: vec!["kafka:9092".to_string()],
            topic: "city_service_logs".to_string(),
            partition: 0,
            queue_capacity: 10_000,
            delivery_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            reconnect_backoff: Duration::from_secs(5),
            max_reconnect_attempts: 5,
            max_delivery_attempts: 3,
            degraded_retry_interval: Some(Duration::from_secs(60)),
            health_check_interval: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(10),
            backoff_jitter: 0.0,
        }
    }
}

impl TelemetryConfig {
    /// Create a new builder for telemetry configuration
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(CoreError::ConfigError(
                "telemetry queue_capacity must be greater than 0".to_string(),
            ));
        }

        if self.topic.is_empty() {
            return Err(CoreError::ConfigError(
                "telemetry topic must not be empty".to_string(),
            ));
        }

        if self.bootstrap_servers.iter().all(|s| s.trim().is_empty()) {
            return Err(CoreError::ConfigError(
                "at least one bootstrap server is required".to_string(),
            ));
        }

        if self.delivery_timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(CoreError::ConfigError(
                "telemetry timeouts must be greater than 0".to_string(),
            ));
        }

        if self.max_reconnect_attempts == 0 || self.max_delivery_attempts == 0 {
            return Err(CoreError::ConfigError(
                "telemetry attempt limits must be greater than 0".to_string(),
            ));
        }

        if self.health_check_interval.is_zero() {
            return Err(CoreError::ConfigError(
                "telemetry health_check_interval must be greater than 0".to_string(),
            ));
        }

        if matches!(self.degraded_retry_interval, Some(d) if d.is_zero()) {
            return Err(CoreError::ConfigError(
                "telemetry degraded_retry_interval must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.backoff_jitter) {
            return Err(CoreError::ConfigError(
                "telemetry backoff_jitter must be within 0.0..=1.0".to_string(),
            ));
        }

        Ok(())
    }

    /// Reconnect pause with random jitter applied
    pub fn backoff_with_jitter(&self) -> Duration {
        if self.backoff_jitter <= 0.0 {
            return self.reconnect_backoff;
        }

        let base = self.reconnect_backoff.as_secs_f64();
        let spread = base * self.backoff_jitter;
        let mut rng = rand::thread_rng();
        let jittered = base + rng.gen_range(-spread..=spread);

        Duration::from_secs_f64(jittered.max(0.0))
    }

    /// Settings for tests and local runs: small queue, short timeouts
    pub fn fast() -> Self {
        Self {
            queue_capacity: 100,
            delivery_timeout: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(1),
            reconnect_backoff: Duration::from_millis(200),
            max_reconnect_attempts: 3,
            health_check_interval: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(2),
            ..Self::default()
        }
    }
}

/// Builder for telemetry configuration
#[derive(Debug, Default)]
pub struct TelemetryConfigBuilder {
    bootstrap_servers: Option<Vec<String>>,
    topic: Option<String>,
    partition: Option<i32>,
    queue_capacity: Option<usize>,
    delivery_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    reconnect_backoff: Option<Duration>,
    max_reconnect_attempts: Option<u32>,
    max_delivery_attempts: Option<u32>,
    degraded_retry_interval: Option<Option<Duration>>,
    health_check_interval: Option<Duration>,
    shutdown_timeout: Option<Duration>,
    backoff_jitter: Option<f64>,
}

impl TelemetryConfigBuilder {
    /// Set bootstrap servers from a comma-separated list
    pub fn bootstrap_servers(mut self, servers: &str) -> Self {
        self.bootstrap_servers = Some(
            servers
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        );
        self
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn partition(mut self, partition: i32) -> Self {
        self.partition = Some(partition);
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub fn delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = Some(backoff);
        self
    }

    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }

    pub fn max_delivery_attempts(mut self, attempts: u32) -> Self {
        self.max_delivery_attempts = Some(attempts);
        self
    }

    /// `None` disables probing once degraded
    pub fn degraded_retry_interval(mut self, interval: Option<Duration>) -> Self {
        self.degraded_retry_interval = Some(interval);
        self
    }

    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = Some(interval);
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    pub fn backoff_jitter(mut self, jitter: f64) -> Self {
        self.backoff_jitter = Some(jitter);
        self
    }

    /// Build the telemetry configuration
    pub fn build(self) -> TelemetryConfig {
        let defaults = TelemetryConfig::default();

        TelemetryConfig {
            bootstrap_servers: self.bootstrap_servers.unwrap_or(defaults.bootstrap_servers),
            topic: self.topic.unwrap_or(defaults.topic),
            partition: self.partition.unwrap_or(defaults.partition),
            queue_capacity: self.queue_capacity.unwrap_or(defaults.queue_capacity),
            delivery_timeout: self.delivery_timeout.unwrap_or(defaults.delivery_timeout),
            connect_timeout: self.connect_timeout.unwrap_or(defaults.connect_timeout),
            reconnect_backoff: self.reconnect_backoff.unwrap_or(defaults.reconnect_backoff),
            max_reconnect_attempts: self
                .max_reconnect_attempts
                .unwrap_or(defaults.max_reconnect_attempts),
            max_delivery_attempts: self
                .max_delivery_attempts
                .unwrap_or(defaults.max_delivery_attempts),
            degraded_retry_interval: self
                .degraded_retry_interval
                .unwrap_or(defaults.degraded_retry_interval),
            health_check_interval: self
                .health_check_interval
                .unwrap_or(defaults.health_check_interval),
            shutdown_timeout: self.shutdown_timeout.unwrap_or(defaults.shutdown_timeout),
            backoff_jitter: self.backoff_jitter.unwrap_or(defaults.backoff_jitter),
        }
    }
}
