//! Non-blocking telemetry emitter
//!
//! `record*` methods never wait and never fail from the caller's point of
//! view: a full queue drops the newest event and counts it. Delivery happens
//! on a single background worker spawned by [`Emitter::start`].

use crate::counters::RequestCounters;
use crate::error::{CoreError, Result};
use crate::health::HealthStatus;
use crate::telemetry::config::TelemetryConfig;
use crate::telemetry::event::{
    new_request_id, ErrorEvent, EventLevel, Metadata, RequestOutcome, SystemEvent,
    TelemetryEvent,
};
use crate::telemetry::metrics::{ConnectionState, DeliveryStats, EmitterMetrics};
use crate::telemetry::sink::{BrokerSink, KafkaSink};
use crate::telemetry::worker::{DeliveryWorker, QueuedEvent};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Handle for recording telemetry events
pub struct Emitter {
    config: TelemetryConfig,
    default_topic: Arc<str>,
    tx: mpsc::Sender<QueuedEvent>,
    sink: Arc<dyn BrokerSink>,
    stats: Arc<DeliveryStats>,
    requests: RequestCounters,
    shutdown_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    started_at: StdMutex<Instant>,
}

impl Emitter {
    /// Validate `config` and spawn the delivery worker on the current runtime
    ///
    /// Fails with a configuration error when called outside a Tokio runtime.
    pub fn start(config: TelemetryConfig, sink: Arc<dyn BrokerSink>) -> Result<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            CoreError::ConfigError(format!("telemetry emitter needs a Tokio runtime: {}", e))
        })?;

        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(DeliveryStats::default());

        let worker = DeliveryWorker::new(
            config.clone(),
            sink.clone(),
            rx,
            shutdown_rx,
            stats.clone(),
        );
        let handle = runtime.spawn(worker.run());

        info!(
            "Telemetry emitter started (topic: {}, queue capacity: {})",
            config.topic, config.queue_capacity
        );

        Ok(Self {
            default_topic: Arc::from(config.topic.as_str()),
            config,
            tx,
            sink,
            stats,
            requests: RequestCounters::default(),
            shutdown_tx,
            worker: Mutex::new(Some(handle)),
            started_at: StdMutex::new(Instant::now()),
        })
    }

    /// Start an emitter publishing to Kafka
    pub fn kafka(config: TelemetryConfig) -> Result<Self> {
        let sink = Arc::new(KafkaSink::new(
            config.bootstrap_servers.clone(),
            config.partition,
        ));
        Self::start(config, sink)
    }

    /// Queue an event for the default topic
    ///
    /// Returns whether the event was accepted; a rejected event is counted
    /// and otherwise ignored.
    pub fn record(&self, event: impl Into<TelemetryEvent>) -> bool {
        self.enqueue(self.default_topic.clone(), event.into())
    }

    /// Queue an event for a specific topic
    pub fn record_to(&self, topic: &str, event: impl Into<TelemetryEvent>) -> bool {
        self.enqueue(Arc::from(topic), event.into())
    }

    /// Count a served request and emit its outcome with running totals
    pub fn record_request(
        &self,
        key: &str,
        latency: Duration,
        cache_hit: bool,
        status_code: u16,
    ) -> bool {
        let totals = self.requests.record(cache_hit);
        let event = RequestOutcome::new(key, latency, cache_hit, status_code)
            .with_request_id(new_request_id())
            .with_running_totals(totals);
        self.record(event)
    }

    pub fn record_system(&self, name: &str, message: &str) -> bool {
        self.record(SystemEvent::new(name, message))
    }

    pub fn record_error(&self, kind: &str, message: &str) -> bool {
        self.record(ErrorEvent::new(kind, message))
    }

    /// Emit the application startup notice
    pub fn record_startup(&self, metadata: Metadata) -> bool {
        self.record(
            SystemEvent::new("application_startup", "City service started successfully")
                .with_metadata(metadata),
        )
    }

    /// Emit the application shutdown notice with final request totals
    pub fn record_shutdown(&self) -> bool {
        let totals = self.requests.snapshot();
        let mut metadata = Metadata::new();
        metadata.insert("total_requests".to_string(), totals.total_requests.into());
        metadata.insert("cache_hits".to_string(), totals.cache_hits.into());
        metadata.insert("cache_misses".to_string(), totals.cache_misses.into());
        metadata.insert(
            "cache_hit_percentage".to_string(),
            totals.cache_hit_percentage.into(),
        );

        self.record(
            SystemEvent::new("application_shutdown", "City service shutting down")
                .with_level(EventLevel::Info)
                .with_metadata(metadata),
        )
    }

    fn enqueue(&self, topic: Arc<str>, event: TelemetryEvent) -> bool {
        match self.tx.try_send(QueuedEvent { topic, event }) {
            Ok(()) => {
                DeliveryStats::incr(&self.stats.enqueued);
                true
            }
            Err(TrySendError::Full(queued)) => {
                DeliveryStats::incr(&self.stats.dropped_full);
                debug!(
                    "Telemetry queue full, dropping {} event",
                    queued.event.event_type()
                );
                false
            }
            Err(TrySendError::Closed(queued)) => {
                DeliveryStats::incr(&self.stats.dropped_full);
                debug!(
                    "Telemetry emitter closed, dropping {} event",
                    queued.event.event_type()
                );
                false
            }
        }
    }

    /// Stop the worker and release the broker connection
    ///
    /// Waits for an in-flight send to finish, bounded by `shutdown_timeout`.
    /// Events still queued are discarded. Calling `close` twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        let Some(mut handle) = self.worker.lock().await.take() else {
            return Ok(());
        };

        // the worker also stops if this fails: it only fails once the receiver is gone
        let _ = self.shutdown_tx.send(true);

        match tokio::time::timeout(self.config.shutdown_timeout, &mut handle).await {
            Ok(Ok(())) => {
                info!("Telemetry emitter closed");
                Ok(())
            }
            Ok(Err(e)) => Err(CoreError::ShutdownError(format!(
                "telemetry worker failed: {}",
                e
            ))),
            Err(_) => {
                let abandoned = self.queue_len() as u64;
                handle.abort();
                DeliveryStats::add(&self.stats.discarded_on_shutdown, abandoned);
                self.stats.set_worker_running(false);
                self.stats.set_state(ConnectionState::Disconnected);
                self.sink.disconnect().await;

                warn!(
                    "Telemetry worker did not stop within {:?}; aborted",
                    self.config.shutdown_timeout
                );
                Err(CoreError::ShutdownError(format!(
                    "telemetry worker did not stop within {:?}",
                    self.config.shutdown_timeout
                )))
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.stats.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Telemetry never makes the service unhealthy, only degraded
    pub fn health(&self) -> HealthStatus {
        match self.state() {
            ConnectionState::Connected => HealthStatus::Healthy,
            _ => HealthStatus::Degraded,
        }
    }

    pub fn queue_len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// Zero the request totals and restart the uptime clock
    ///
    /// Delivery counters are left alone; they describe the worker, not traffic.
    pub fn reset_metrics(&self) {
        self.requests.reset();
        *self
            .started_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
        info!("Telemetry request metrics reset");
    }

    fn uptime(&self) -> Duration {
        self.started_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    /// Non-blocking metrics snapshot
    pub fn metrics(&self) -> EmitterMetrics {
        EmitterMetrics::from_stats(
            &self.stats,
            self.queue_len(),
            self.config.queue_capacity,
            self.requests.snapshot(),
            self.uptime(),
        )
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("topic", &self.default_topic)
            .field("sink", &self.sink.name())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::RunningTotals;
    use async_trait::async_trait;

    /// Sink that accepts everything and remembers payloads
    #[derive(Default)]
    struct RecordingSink {
        sent: StdMutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl BrokerSink for RecordingSink {
        async fn connect(&self) -> Result<()> {
            Ok(())
        }

        async fn send(&self, topic: &str, _key: Option<&str>, payload: &[u8]) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((topic.to_string(), payload.to_vec()));
            Ok(())
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }

        async fn disconnect(&self) {}

        fn name(&self) -> &str {
            "recording"
        }
    }

    async fn wait_for(emitter: &Emitter, done: impl Fn(&EmitterMetrics) -> bool) {
        for _ in 0..1_000 {
            if done(&emitter.metrics()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached: {:?}", emitter.metrics());
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_request_carries_running_totals() {
        let sink = Arc::new(RecordingSink::default());
        let emitter = Emitter::start(TelemetryConfig::fast(), sink.clone()).unwrap();

        assert!(emitter.record_request("paris", Duration::from_millis(2), false, 200));
        assert!(emitter.record_request("paris", Duration::from_millis(1), true, 200));
        wait_for(&emitter, |m| m.delivered == 2).await;

        let sent = sink.sent.lock().unwrap().clone();
        let last: serde_json::Value = serde_json::from_slice(&sent[1].1).unwrap();
        assert_eq!(sent[1].0, "city_service_logs");
        assert_eq!(last["total_requests"], 2);
        assert_eq!(last["cache_hits"], 1);
        assert_eq!(last["cache_hit_percentage"], 50.0);
        assert!(last["request_id"].is_string());

        let metrics = emitter.metrics();
        assert_eq!(metrics.requests.total_requests, 2);
        assert_eq!(metrics.state, ConnectionState::Connected);
        assert_eq!(emitter.health(), HealthStatus::Healthy);

        emitter.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_to_other_topic() {
        let sink = Arc::new(RecordingSink::default());
        let emitter = Emitter::start(TelemetryConfig::fast(), sink.clone()).unwrap();

        emitter.record_to("audit", SystemEvent::new("x", "y"));
        wait_for(&emitter, |m| m.delivered == 1).await;

        assert_eq!(sink.sent.lock().unwrap()[0].0, "audit");
        emitter.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_after_close_is_dropped() {
        let emitter =
            Emitter::start(TelemetryConfig::fast(), Arc::new(RecordingSink::default())).unwrap();

        emitter.close().await.unwrap();
        emitter.close().await.unwrap();

        assert!(!emitter.record_system("late", "after close"));
        let metrics = emitter.metrics();
        assert_eq!(metrics.dropped_full, 1);
        assert!(!metrics.worker_running);
        assert_eq!(metrics.state, ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_metrics_clears_totals_and_uptime() {
        let emitter =
            Emitter::start(TelemetryConfig::fast(), Arc::new(RecordingSink::default())).unwrap();

        emitter.record_request("paris", Duration::from_millis(1), true, 200);
        emitter.record_request("lima", Duration::from_millis(1), false, 200);
        wait_for(&emitter, |m| m.delivered == 2).await;
        tokio::time::sleep(Duration::from_secs(90)).await;
        assert!(emitter.metrics().uptime >= Duration::from_secs(90));

        emitter.reset_metrics();

        let metrics = emitter.metrics();
        assert_eq!(metrics.requests, RunningTotals::default());
        assert!(metrics.uptime < Duration::from_secs(1));
        assert_eq!(metrics.delivered, 2);

        // totals restart from zero on the next request
        emitter.record_request("oslo", Duration::from_millis(1), true, 200);
        assert_eq!(emitter.metrics().requests.total_requests, 1);

        emitter.close().await.unwrap();
    }

    #[test]
    fn test_start_outside_runtime_is_an_error() {
        let result = Emitter::start(TelemetryConfig::fast(), Arc::new(RecordingSink::default()));
        match result {
            Err(CoreError::ConfigError(msg)) => assert!(msg.contains("Tokio runtime")),
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_zero_capacity_is_rejected() {
        let config = TelemetryConfig::builder().queue_capacity(0).build();
        let result = Emitter::start(config, Arc::new(RecordingSink::default()));
        assert!(matches!(result, Err(CoreError::ConfigError(_))));
    }
}
