//! # Best-Effort Telemetry
//!
//! Request outcomes, lifecycle notices and errors are recorded without ever
//! blocking the request path. Events go into a bounded queue drained by one
//! background worker that publishes compact JSON to a Kafka topic.
//!
//! Delivery is at-most-once: a full queue drops the newest event, an event
//! that keeps failing is dropped after a bounded number of attempts, and
//! events still queued at shutdown are discarded. Every drop is counted in
//! [`EmitterMetrics`].
//!
//! ## Example
//!
//! ```no_run
//! use citycode_core::telemetry::{Emitter, TelemetryConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> citycode_core::Result<()> {
//! let emitter = Emitter::kafka(TelemetryConfig::default())?;
//!
//! emitter.record_request("Paris", Duration::from_millis(3), true, 200);
//! println!("{:?}", emitter.metrics());
//!
//! emitter.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod emitter;
pub mod event;
pub mod metrics;
pub mod sink;
mod worker;

pub use config::{TelemetryConfig, TelemetryConfigBuilder};
pub use emitter::Emitter;
pub use event::{
    new_request_id, ErrorEvent, EventLevel, Metadata, RequestOutcome, SystemEvent,
    TelemetryEvent, SERVICE_NAME, SERVICE_VERSION,
};
pub use metrics::{ConnectionState, EmitterMetrics};
pub use sink::{BrokerSink, KafkaSink};
