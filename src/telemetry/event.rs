//! Telemetry event model
//!
//! Events are built by the request path, handed to the emitter, and published
//! as compact JSON. Optional fields left unset are omitted from the payload.

use crate::counters::RunningTotals;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Service name stamped on every event
pub const SERVICE_NAME: &str = "city_service";

/// Crate version stamped on every event
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Free-form key/value attachment
pub type Metadata = BTreeMap<String, Value>;

fn default_service() -> String {
    SERVICE_NAME.to_string()
}

fn default_version() -> String {
    SERVICE_VERSION.to_string()
}

/// Fresh random request identifier
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Severity of a system event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

/// Latency on the wire: milliseconds, two decimals
mod latency_ms {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(latency: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = (latency.as_secs_f64() * 1000.0 * 100.0).round() / 100.0;
        serializer.serialize_f64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(ms.max(0.0) / 1000.0).map_err(D::Error::custom)
    }
}

/// Outcome of one lookup request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestOutcome {
    pub timestamp: DateTime<Utc>,

    /// Looked-up key, e.g. the city name
    pub key: String,

    #[serde(rename = "response_time_ms", with = "latency_ms")]
    pub latency: Duration,

    pub cache_hit: bool,

    pub status_code: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Process totals including this request
    #[serde(flatten)]
    pub running_totals: Option<RunningTotals>,

    #[serde(default = "default_service")]
    pub service: String,

    #[serde(default = "default_version")]
    pub version: String,
}

impl RequestOutcome {
    pub fn new(key: impl Into<String>, latency: Duration, cache_hit: bool, status_code: u16) -> Self {
        Self {
            timestamp: Utc::now(),
            key: key.into(),
            latency,
            cache_hit,
            status_code,
            request_id: None,
            endpoint: None,
            method: None,
            running_totals: None,
            service: default_service(),
            version: default_version(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_running_totals(mut self, totals: RunningTotals) -> Self {
        self.running_totals = Some(totals);
        self
    }
}

/// Lifecycle or operational notice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemEvent {
    pub timestamp: DateTime<Utc>,

    #[serde(rename = "event_name")]
    pub name: String,

    pub message: String,

    #[serde(default)]
    pub level: EventLevel,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    #[serde(default = "default_service")]
    pub service: String,

    #[serde(default = "default_version")]
    pub version: String,
}

impl SystemEvent {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            name: name.into(),
            message: message.into(),
            level: EventLevel::Info,
            metadata: None,
            service: default_service(),
            version: default_version(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_level(mut self, level: EventLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Failure report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub timestamp: DateTime<Utc>,

    #[serde(rename = "error_type")]
    pub kind: String,

    #[serde(rename = "error_message")]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Metadata>,

    #[serde(default = "default_service")]
    pub service: String,

    #[serde(default = "default_version")]
    pub version: String,
}

impl ErrorEvent {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind: kind.into(),
            message: message.into(),
            stack_trace: None,
            context: None,
            service: default_service(),
            version: default_version(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    pub fn with_context(mut self, context: Metadata) -> Self {
        self.context = Some(context);
        self
    }
}

/// Any event the emitter can publish
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum TelemetryEvent {
    #[serde(rename = "api_request")]
    RequestOutcome(RequestOutcome),

    #[serde(rename = "system_event")]
    SystemEvent(SystemEvent),

    #[serde(rename = "error")]
    ErrorEvent(ErrorEvent),
}

impl TelemetryEvent {
    /// Creation time of the event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            TelemetryEvent::RequestOutcome(e) => e.timestamp,
            TelemetryEvent::SystemEvent(e) => e.timestamp,
            TelemetryEvent::ErrorEvent(e) => e.timestamp,
        }
    }

    /// Wire discriminator
    pub fn event_type(&self) -> &'static str {
        match self {
            TelemetryEvent::RequestOutcome(_) => "api_request",
            TelemetryEvent::SystemEvent(_) => "system_event",
            TelemetryEvent::ErrorEvent(_) => "error",
        }
    }

    /// Record key for partitioning; request events key on the looked-up name
    pub fn routing_key(&self) -> Option<&str> {
        match self {
            TelemetryEvent::RequestOutcome(e) => Some(e.key.as_str()),
            _ => None,
        }
    }

    /// Compact JSON payload
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl From<RequestOutcome> for TelemetryEvent {
    fn from(event: RequestOutcome) -> Self {
        TelemetryEvent::RequestOutcome(event)
    }
}

impl From<SystemEvent> for TelemetryEvent {
    fn from(event: SystemEvent) -> Self {
        TelemetryEvent::SystemEvent(event)
    }
}

impl From<ErrorEvent> for TelemetryEvent {
    fn from(event: ErrorEvent) -> Self {
        TelemetryEvent::ErrorEvent(event)
    }
}
