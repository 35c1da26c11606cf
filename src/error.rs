//! Error types for the cache and telemetry core
//!
//! Most hot-path operations in this crate never return these errors: remote
//! and broker failures are contained and reported as neutral values. `Result`
//! shows up at construction boundaries (config validation, pool creation) and
//! inside the adapters before their failures are folded into health flags.

use thiserror::Error;

/// Main error type for the cache and telemetry core
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration error - invalid values or unparsable environment
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Connection error - remote cache or broker unreachable
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Operation timeout
    #[error("Operation timed out after {timeout_ms}ms: {context}")]
    TimeoutError { timeout_ms: u64, context: String },

    /// Connection pool could not be built or handed out a connection
    #[error("Connection pool error: {0}")]
    PoolError(String),

    /// Broker produce/metadata failure
    #[error("Broker error: {0}")]
    BrokerError(String),

    /// Remote tier is not connected
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Redis driver error (wrapper)
    #[error("Redis driver error: {0}")]
    RedisError(#[from] redis::RedisError),

    /// Shutdown did not complete cleanly
    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

impl CoreError {
    /// Build a timeout error from the elapsed bound
    pub fn timeout(timeout: std::time::Duration, context: impl Into<String>) -> Self {
        CoreError::TimeoutError {
            timeout_ms: timeout.as_millis() as u64,
            context: context.into(),
        }
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl From<String> for CoreError {
    fn from(s: String) -> Self {
        CoreError::Other(s)
    }
}

impl From<&str> for CoreError {
    fn from(s: &str) -> Self {
        CoreError::Other(s.to_string())
    }
}
