//! Health reporting shared by the cache coordinator and telemetry emitter

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health status enum
///
/// Neither tier nor the emitter can take the service down, so there is no
/// unhealthy state: a missing optional dependency only degrades it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every tier or connection is available
    Healthy,
    /// Serving requests with an optional dependency unavailable
    Degraded,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
        }
    }
}

/// Connectivity as reported by the remote tier's server info
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    Connected,
    #[default]
    Disconnected,
    Error,
}

/// Server-side view of the remote tier for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteInfo {
    pub status: RemoteStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
    /// Human-readable memory usage, e.g. `1.02M`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_clients: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_connections_received: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyspace_hits: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyspace_misses: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RemoteInfo {
    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: RemoteStatus::Error,
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Parse the `key:value` lines of a Redis `INFO` reply
    ///
    /// Section headers, blank lines and unknown fields are ignored; a field
    /// that does not parse is left unset.
    pub fn from_redis_info(text: &str) -> Self {
        let mut info = Self {
            status: RemoteStatus::Connected,
            ..Self::default()
        };

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };

            match field {
                "redis_version" => info.server_version = Some(value.to_string()),
                "used_memory_human" => info.used_memory = Some(value.to_string()),
                "connected_clients" => info.connected_clients = value.parse().ok(),
                "total_connections_received" => {
                    info.total_connections_received = value.parse().ok()
                }
                "keyspace_hits" => info.keyspace_hits = value.parse().ok(),
                "keyspace_misses" => info.keyspace_misses = value.parse().ok(),
                _ => {}
            }
        }

        info
    }
}

/// Result of probing the cache tiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheHealth {
    /// Overall status
    pub status: HealthStatus,
    /// The in-process tier is always operable
    pub local_healthy: bool,
    /// Outcome of the remote round-trip
    pub remote_healthy: bool,
    /// Remote implementation name
    pub remote_backend: String,
    /// Server info from the remote tier
    pub remote_info: RemoteInfo,
    /// Time of the probe
    pub checked_at: DateTime<Utc>,
}

impl CacheHealth {
    pub fn new(remote_healthy: bool, remote_backend: impl Into<String>) -> Self {
        let status = if remote_healthy {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        Self {
            status,
            local_healthy: true,
            remote_healthy,
            remote_backend: remote_backend.into(),
            remote_info: RemoteInfo::disconnected(),
            checked_at: Utc::now(),
        }
    }

    pub fn with_remote_info(mut self, info: RemoteInfo) -> Self {
        self.remote_info = info;
        self
    }

    /// Whether the coordinator can serve requests
    pub fn is_healthy(&self) -> bool {
        self.local_healthy
    }
}
