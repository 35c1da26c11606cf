//! Integration tests for the telemetry emitter
//!
//! Broker behaviour is scripted through a fake sink; tests run on a paused
//! clock so reconnect backoff and probe intervals elapse instantly.

use async_trait::async_trait;
use citycode_core::telemetry::{
    BrokerSink, ConnectionState, Emitter, EmitterMetrics, SystemEvent, TelemetryConfig,
};
use citycode_core::{CoreError, HealthStatus, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::assert_ok;

/// Scripted broker: connect and send outcomes are popped from queues,
/// falling back to a default once a script runs out
struct ScriptedSink {
    connect_script: Mutex<VecDeque<bool>>,
    connect_default: AtomicBool,
    send_script: Mutex<VecDeque<bool>>,
    send_default: AtomicBool,
    hang_sends: AtomicBool,
    hang_connects: AtomicBool,
    hang_health_checks: AtomicBool,
    delivered: Mutex<Vec<String>>,
    connects: AtomicUsize,
    sends: AtomicUsize,
    health_checks: AtomicUsize,
    disconnects: AtomicUsize,
}

impl ScriptedSink {
    fn healthy() -> Arc<Self> {
        Arc::new(Self {
            connect_script: Mutex::new(VecDeque::new()),
            connect_default: AtomicBool::new(true),
            send_script: Mutex::new(VecDeque::new()),
            send_default: AtomicBool::new(true),
            hang_sends: AtomicBool::new(false),
            hang_connects: AtomicBool::new(false),
            hang_health_checks: AtomicBool::new(false),
            delivered: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            sends: AtomicUsize::new(0),
            health_checks: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        })
    }

    fn unreachable() -> Arc<Self> {
        let sink = Self::healthy();
        sink.connect_default.store(false, Ordering::SeqCst);
        sink
    }

    fn script_connects(&self, outcomes: &[bool]) {
        self.connect_script.lock().unwrap().extend(outcomes);
    }

    fn script_sends(&self, outcomes: &[bool]) {
        self.send_script.lock().unwrap().extend(outcomes);
    }

    fn delivered_names(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrokerSink for ScriptedSink {
    async fn connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let scripted = self.connect_script.lock().unwrap().pop_front();
        if scripted.is_none() && self.hang_connects.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let ok = scripted.unwrap_or_else(|| self.connect_default.load(Ordering::SeqCst));

        if ok {
            Ok(())
        } else {
            Err(CoreError::ConnectionError("broker refused".to_string()))
        }
    }

    async fn send(&self, _topic: &str, _key: Option<&str>, payload: &[u8]) -> Result<()> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        if self.hang_sends.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let ok = self
            .send_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.send_default.load(Ordering::SeqCst));
        if !ok {
            return Err(CoreError::BrokerError("produce failed".to_string()));
        }

        let json: serde_json::Value = serde_json::from_slice(payload)?;
        let name = json["event_name"].as_str().unwrap_or_default().to_string();
        self.delivered.lock().unwrap().push(name);
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        if self.hang_health_checks.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn test_config() -> TelemetryConfig {
    TelemetryConfig::builder()
        .queue_capacity(16)
        .delivery_timeout(Duration::from_millis(500))
        .connect_timeout(Duration::from_secs(1))
        .reconnect_backoff(Duration::from_secs(5))
        .max_reconnect_attempts(3)
        .max_delivery_attempts(3)
        .degraded_retry_interval(Some(Duration::from_secs(60)))
        .shutdown_timeout(Duration::from_secs(2))
        .build()
}

async fn wait_for(emitter: &Emitter, done: impl Fn(&EmitterMetrics) -> bool) {
    for _ in 0..10_000 {
        if done(&emitter.metrics()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached: {:?}", emitter.metrics());
}

fn named(name: &str) -> SystemEvent {
    SystemEvent::new(name, "test")
}

#[tokio::test(start_paused = true)]
async fn test_events_delivered_in_order() {
    let sink = ScriptedSink::healthy();
    let emitter = Emitter::start(test_config(), sink.clone()).unwrap();

    for name in ["a", "b", "c", "d", "e"] {
        assert!(emitter.record(named(name)));
    }
    wait_for(&emitter, |m| m.delivered == 5).await;

    assert_eq!(sink.delivered_names(), vec!["a", "b", "c", "d", "e"]);
    assert_eq!(emitter.state(), ConnectionState::Connected);
    assert_eq!(emitter.metrics().total_dropped(), 0);

    assert_ok!(emitter.close().await);
}

#[tokio::test(start_paused = true)]
async fn test_full_queue_drops_newest_without_blocking() {
    let config = TelemetryConfig::builder()
        .queue_capacity(2)
        .max_reconnect_attempts(3)
        .build();
    let emitter = Emitter::start(config, ScriptedSink::unreachable()).unwrap();

    // nothing has yielded to the worker yet, so the queue only fills
    let accepted: Vec<bool> = (0..5)
        .map(|i| emitter.record(named(&format!("e{}", i))))
        .collect();

    assert_eq!(accepted, vec![true, true, false, false, false]);
    let metrics = emitter.metrics();
    assert_eq!(metrics.enqueued, 2);
    assert_eq!(metrics.dropped_full, 3);
    assert_eq!(metrics.queue_len, 2);

    assert_ok!(emitter.close().await);
}

#[tokio::test(start_paused = true)]
async fn test_transient_send_failure_is_retried_in_order() {
    let sink = ScriptedSink::healthy();
    // first, second, then a failure on the third send before it succeeds
    sink.script_sends(&[true, true, false]);
    let emitter = Emitter::start(test_config(), sink.clone()).unwrap();

    for name in ["a", "b", "c", "d"] {
        emitter.record(named(name));
    }
    wait_for(&emitter, |m| m.delivered == 4).await;

    assert_eq!(sink.delivered_names(), vec!["a", "b", "c", "d"]);
    let metrics = emitter.metrics();
    assert_eq!(metrics.retried, 1);
    assert_eq!(metrics.dropped_undeliverable, 0);
    // one reconnect after the failed send
    assert_eq!(sink.connects.load(Ordering::SeqCst), 2);

    assert_ok!(emitter.close().await);
}

#[tokio::test(start_paused = true)]
async fn test_event_dropped_after_attempt_limit() {
    let sink = ScriptedSink::healthy();
    sink.script_sends(&[false, false, false]);
    let emitter = Emitter::start(test_config(), sink.clone()).unwrap();

    emitter.record(named("doomed"));
    emitter.record(named("next"));
    wait_for(&emitter, |m| m.dropped_undeliverable == 1 && m.delivered == 1).await;

    assert_eq!(sink.sends.load(Ordering::SeqCst), 4);
    assert_eq!(sink.delivered_names(), vec!["next"]);
    assert_eq!(emitter.metrics().retried, 2);

    assert_ok!(emitter.close().await);
}

#[tokio::test(start_paused = true)]
async fn test_send_timeout_counts_as_failure() {
    let sink = ScriptedSink::healthy();
    sink.hang_sends.store(true, Ordering::SeqCst);
    let emitter = Emitter::start(test_config(), sink.clone()).unwrap();

    emitter.record(named("slow"));
    wait_for(&emitter, |m| m.dropped_undeliverable == 1).await;

    assert_eq!(sink.sends.load(Ordering::SeqCst), 3);
    assert_eq!(emitter.metrics().delivered, 0);

    assert_ok!(emitter.close().await);
}

#[tokio::test(start_paused = true)]
async fn test_degraded_after_reconnect_attempts() {
    let sink = ScriptedSink::unreachable();
    let emitter = Emitter::start(test_config(), sink.clone()).unwrap();

    wait_for(&emitter, |m| m.state == ConnectionState::Degraded).await;
    assert_eq!(sink.connects.load(Ordering::SeqCst), 3);
    assert_eq!(emitter.health(), HealthStatus::Degraded);

    // producers keep going; the worker drains and discards
    for i in 0..40 {
        emitter.record(named(&format!("lost{}", i)));
        tokio::task::yield_now().await;
    }
    wait_for(&emitter, |m| m.dropped_degraded == 40 - m.dropped_full).await;

    let metrics = emitter.metrics();
    assert_eq!(metrics.delivered, 0);
    assert!(metrics.worker_running);

    assert_ok!(emitter.close().await);
}

#[tokio::test(start_paused = true)]
async fn test_recovers_from_degraded_on_probe() {
    let sink = ScriptedSink::healthy();
    sink.script_connects(&[false, false, false, false]);
    let emitter = Emitter::start(test_config(), sink.clone()).unwrap();

    wait_for(&emitter, |m| m.state == ConnectionState::Degraded).await;
    // first probe fails, second succeeds
    wait_for(&emitter, |m| m.state == ConnectionState::Connected).await;
    assert_eq!(sink.connects.load(Ordering::SeqCst), 5);

    emitter.record(named("back"));
    wait_for(&emitter, |m| m.delivered == 1).await;
    assert_eq!(sink.delivered_names(), vec!["back"]);

    assert_ok!(emitter.close().await);
}

#[tokio::test(start_paused = true)]
async fn test_degraded_without_probe_stays_degraded() {
    let config = TelemetryConfig::builder()
        .max_reconnect_attempts(2)
        .degraded_retry_interval(None)
        .build();
    let sink = ScriptedSink::unreachable();
    let emitter = Emitter::start(config, sink.clone()).unwrap();

    wait_for(&emitter, |m| m.state == ConnectionState::Degraded).await;
    tokio::time::sleep(Duration::from_secs(3600)).await;

    assert_eq!(emitter.state(), ConnectionState::Degraded);
    assert_eq!(sink.connects.load(Ordering::SeqCst), 2);

    assert_ok!(emitter.close().await);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_discards_queue_promptly() {
    let sink = ScriptedSink::unreachable();
    let emitter = Emitter::start(test_config(), sink.clone()).unwrap();

    for name in ["x", "y", "z"] {
        emitter.record(named(name));
    }

    let started = tokio::time::Instant::now();
    assert_ok!(emitter.close().await);
    assert!(started.elapsed() < Duration::from_secs(2));

    let metrics = emitter.metrics();
    assert_eq!(metrics.discarded_on_shutdown, 3);
    assert_eq!(metrics.delivered, 0);
    assert!(!metrics.worker_running);
    assert_eq!(sink.disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_close_interrupts_hanging_degraded_reconnect() {
    let sink = ScriptedSink::healthy();
    sink.script_connects(&[false, false]);
    sink.hang_connects.store(true, Ordering::SeqCst);
    let config = TelemetryConfig::builder()
        .connect_timeout(Duration::from_secs(10))
        .reconnect_backoff(Duration::from_secs(1))
        .max_reconnect_attempts(2)
        .degraded_retry_interval(Some(Duration::from_secs(5)))
        .shutdown_timeout(Duration::from_secs(2))
        .build();
    let emitter = Emitter::start(config, sink.clone()).unwrap();

    wait_for(&emitter, |m| m.state == ConnectionState::Degraded).await;
    // third connect is the degraded retry, which never answers
    wait_for(&emitter, |_| sink.connects.load(Ordering::SeqCst) == 3).await;

    let started = tokio::time::Instant::now();
    assert_ok!(emitter.close().await);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!emitter.metrics().worker_running);
    assert_eq!(sink.disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_close_interrupts_hanging_health_check() {
    let sink = ScriptedSink::healthy();
    sink.hang_health_checks.store(true, Ordering::SeqCst);
    let config = TelemetryConfig::builder()
        .delivery_timeout(Duration::from_secs(10))
        .health_check_interval(Duration::from_secs(1))
        .shutdown_timeout(Duration::from_secs(2))
        .build();
    let emitter = Emitter::start(config, sink.clone()).unwrap();

    wait_for(&emitter, |_| sink.health_checks.load(Ordering::SeqCst) == 1).await;
    assert_eq!(emitter.state(), ConnectionState::Connected);

    let started = tokio::time::Instant::now();
    assert_ok!(emitter.close().await);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!emitter.metrics().worker_running);
}

#[tokio::test(start_paused = true)]
async fn test_close_waits_for_in_flight_send_then_gives_up() {
    let sink = ScriptedSink::healthy();
    sink.hang_sends.store(true, Ordering::SeqCst);
    let config = TelemetryConfig::builder()
        .delivery_timeout(Duration::from_secs(30))
        .shutdown_timeout(Duration::from_secs(1))
        .build();
    let emitter = Emitter::start(config, sink.clone()).unwrap();

    emitter.record(named("stuck"));
    wait_for(&emitter, |_| sink.sends.load(Ordering::SeqCst) == 1).await;

    let result = emitter.close().await;
    assert!(matches!(result, Err(CoreError::ShutdownError(_))));
    assert!(!emitter.metrics().worker_running);
    assert_eq!(sink.disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_record_from_many_tasks() {
    let emitter = Arc::new(Emitter::start(test_config(), ScriptedSink::healthy()).unwrap());

    let tasks = (0..8).map(|i| {
        let emitter = emitter.clone();
        async move {
            for j in 0..4 {
                emitter.record_request(
                    &format!("city{}", j),
                    Duration::from_millis(1),
                    (i + j) % 2 == 0,
                    200,
                );
            }
        }
    });
    futures::future::join_all(tasks).await;

    let metrics = emitter.metrics();
    assert_eq!(metrics.requests.total_requests, 32);
    assert_eq!(metrics.requests.cache_hits, 16);
    assert_eq!(metrics.enqueued + metrics.dropped_full, 32);

    assert_ok!(emitter.close().await);
}
