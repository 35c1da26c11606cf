//! Background delivery worker
//!
//! Exactly one worker drains the emitter queue. It owns the broker
//! connection state machine:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected (send/probe failure)
//!                     |
//!                     +-> Degraded after max_reconnect_attempts failures
//! ```
//!
//! Every wait, connect attempt and broker probe races the shutdown signal. A
//! send already in flight is allowed to finish under its own delivery timeout.

use crate::telemetry::config::TelemetryConfig;
use crate::telemetry::event::TelemetryEvent;
use crate::telemetry::metrics::{ConnectionState, DeliveryStats};
use crate::telemetry::sink::BrokerSink;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tracing::{debug, error, info, warn};

/// One queued event with its destination topic
#[derive(Debug, Clone)]
pub(crate) struct QueuedEvent {
    pub(crate) topic: Arc<str>,
    pub(crate) event: TelemetryEvent,
}

/// Event held at the head of the queue while it is retried
struct Pending {
    topic: Arc<str>,
    key: Option<String>,
    payload: Vec<u8>,
    attempts: u32,
}

type Flow = ControlFlow<()>;

pub(crate) struct DeliveryWorker {
    config: TelemetryConfig,
    sink: Arc<dyn BrokerSink>,
    rx: mpsc::Receiver<QueuedEvent>,
    shutdown: watch::Receiver<bool>,
    stats: Arc<DeliveryStats>,
    pending: Option<Pending>,
    reconnect_failures: u32,
    next_degraded_probe: Option<Instant>,
}

impl DeliveryWorker {
    pub(crate) fn new(
        config: TelemetryConfig,
        sink: Arc<dyn BrokerSink>,
        rx: mpsc::Receiver<QueuedEvent>,
        shutdown: watch::Receiver<bool>,
        stats: Arc<DeliveryStats>,
    ) -> Self {
        Self {
            config,
            sink,
            rx,
            shutdown,
            stats,
            pending: None,
            reconnect_failures: 0,
            next_degraded_probe: None,
        }
    }

    /// Run until shutdown is signalled or every emitter handle is gone
    pub(crate) async fn run(mut self) {
        self.stats.set_worker_running(true);
        info!("Telemetry worker started (sink: {})", self.sink.name());

        loop {
            let flow = match self.stats.state() {
                ConnectionState::Disconnected | ConnectionState::Connecting => {
                    self.connect_step().await
                }
                ConnectionState::Connected => self.deliver_step().await,
                ConnectionState::Degraded => self.degraded_step().await,
            };

            if flow.is_break() {
                break;
            }
        }

        self.finish().await;
    }

    async fn connect_step(&mut self) -> Flow {
        self.stats.set_state(ConnectionState::Connecting);
        DeliveryStats::incr(&self.stats.connect_attempts);

        let connect_timeout = self.config.connect_timeout;
        let result = tokio::select! {
            _ = wait_for_shutdown(&mut self.shutdown) => return ControlFlow::Break(()),
            r = timeout(connect_timeout, self.sink.connect()) => r,
        };

        let error = match result {
            Ok(Ok(())) => {
                self.reconnect_failures = 0;
                self.stats.set_state(ConnectionState::Connected);
                info!("Telemetry broker connected ({})", self.sink.name());
                return ControlFlow::Continue(());
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("connect timed out after {:?}", connect_timeout),
        };

        self.reconnect_failures += 1;
        warn!(
            "Telemetry broker connection attempt {}/{} failed: {}",
            self.reconnect_failures, self.config.max_reconnect_attempts, error
        );

        if self.reconnect_failures >= self.config.max_reconnect_attempts {
            self.enter_degraded();
            return ControlFlow::Continue(());
        }

        self.stats.set_state(ConnectionState::Disconnected);
        self.pause(self.config.backoff_with_jitter()).await
    }

    async fn deliver_step(&mut self) -> Flow {
        let mut pending = match self.pending.take() {
            Some(pending) => pending,
            None => {
                let health_check_interval = self.config.health_check_interval;
                let next = tokio::select! {
                    biased;
                    _ = wait_for_shutdown(&mut self.shutdown) => return ControlFlow::Break(()),
                    msg = self.rx.recv() => msg,
                    _ = sleep(health_check_interval) => return self.probe_connected().await,
                };

                let Some(queued) = next else {
                    return ControlFlow::Break(());
                };

                match encode(queued) {
                    Some(pending) => pending,
                    None => {
                        DeliveryStats::incr(&self.stats.dropped_undeliverable);
                        return ControlFlow::Continue(());
                    }
                }
            }
        };

        let delivery_timeout = self.config.delivery_timeout;
        let result = timeout(
            delivery_timeout,
            self.sink
                .send(&pending.topic, pending.key.as_deref(), &pending.payload),
        )
        .await;

        let error = match result {
            Ok(Ok(())) => {
                DeliveryStats::incr(&self.stats.delivered);
                debug!("Telemetry event delivered to topic: {}", pending.topic);
                return ControlFlow::Continue(());
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("send timed out after {:?}", delivery_timeout),
        };

        pending.attempts += 1;
        if pending.attempts >= self.config.max_delivery_attempts {
            DeliveryStats::incr(&self.stats.dropped_undeliverable);
            error!(
                "Dropping telemetry event for topic {} after {} attempts: {}",
                pending.topic, pending.attempts, error
            );
        } else {
            DeliveryStats::incr(&self.stats.retried);
            warn!(
                "Telemetry delivery attempt {}/{} failed: {}",
                pending.attempts, self.config.max_delivery_attempts, error
            );
            self.pending = Some(pending);
        }

        self.stats.set_state(ConnectionState::Disconnected);
        self.pause(self.config.backoff_with_jitter()).await
    }

    /// Idle health probe while connected
    async fn probe_connected(&mut self) -> Flow {
        let delivery_timeout = self.config.delivery_timeout;
        let probe = tokio::select! {
            _ = wait_for_shutdown(&mut self.shutdown) => return ControlFlow::Break(()),
            r = timeout(delivery_timeout, self.sink.health_check()) => r,
        };

        match probe {
            Ok(Ok(())) => debug!("Telemetry broker health check passed"),
            Ok(Err(e)) => {
                warn!("Telemetry broker health check failed: {}", e);
                self.stats.set_state(ConnectionState::Disconnected);
            }
            Err(_) => {
                warn!("Telemetry broker health check timed out");
                self.stats.set_state(ConnectionState::Disconnected);
            }
        }

        ControlFlow::Continue(())
    }

    fn enter_degraded(&mut self) {
        self.stats.set_state(ConnectionState::Degraded);
        self.next_degraded_probe = self
            .config
            .degraded_retry_interval
            .map(|interval| Instant::now() + interval);

        if let Some(pending) = self.pending.take() {
            DeliveryStats::incr(&self.stats.dropped_degraded);
            debug!("Discarding pending event for topic: {}", pending.topic);
        }

        error!(
            "Telemetry broker unreachable after {} attempts; running without telemetry delivery",
            self.reconnect_failures
        );
    }

    /// Drain and discard while degraded, probing the broker now and then
    async fn degraded_step(&mut self) -> Flow {
        let next_probe = self.next_degraded_probe;

        tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut self.shutdown) => ControlFlow::Break(()),
            msg = self.rx.recv() => match msg {
                Some(queued) => {
                    DeliveryStats::incr(&self.stats.dropped_degraded);
                    debug!("Degraded: discarded {} event", queued.event.event_type());
                    ControlFlow::Continue(())
                }
                None => ControlFlow::Break(()),
            },
            _ = wait_until(next_probe) => self.probe_degraded().await,
        }
    }

    async fn probe_degraded(&mut self) -> Flow {
        DeliveryStats::incr(&self.stats.connect_attempts);
        let connect_timeout = self.config.connect_timeout;
        let probe = tokio::select! {
            _ = wait_for_shutdown(&mut self.shutdown) => return ControlFlow::Break(()),
            r = timeout(connect_timeout, self.sink.connect()) => r,
        };

        if let Ok(Ok(())) = probe {
            self.reconnect_failures = 0;
            self.next_degraded_probe = None;
            self.stats.set_state(ConnectionState::Connected);
            info!("Telemetry broker reachable again; delivery resumed");
        } else {
            debug!("Telemetry broker still unreachable");
            self.next_degraded_probe = self
                .config
                .degraded_retry_interval
                .map(|interval| Instant::now() + interval);
        }

        ControlFlow::Continue(())
    }

    async fn pause(&mut self, duration: Duration) -> Flow {
        tokio::select! {
            _ = wait_for_shutdown(&mut self.shutdown) => ControlFlow::Break(()),
            _ = sleep(duration) => ControlFlow::Continue(()),
        }
    }

    /// Discard whatever is still queued and release the broker
    async fn finish(mut self) {
        let mut discarded = u64::from(self.pending.take().is_some());

        self.rx.close();
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        DeliveryStats::add(&self.stats.discarded_on_shutdown, discarded);

        self.sink.disconnect().await;
        self.stats.set_state(ConnectionState::Disconnected);
        self.stats.set_worker_running(false);

        info!(
            "Telemetry worker stopped ({} queued events discarded)",
            discarded
        );
    }
}

fn encode(queued: QueuedEvent) -> Option<Pending> {
    match queued.event.to_json_bytes() {
        Ok(payload) => Some(Pending {
            key: queued.event.routing_key().map(str::to_string),
            topic: queued.topic,
            payload,
            attempts: 0,
        }),
        Err(e) => {
            error!("Failed to encode telemetry event: {}", e);
            None
        }
    }
}

/// Resolves once shutdown is requested or the emitter handle is gone
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
