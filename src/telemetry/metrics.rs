//! Emitter connection state and delivery counters

use crate::counters::RunningTotals;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

/// Broker connection state as seen by the delivery worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Reconnect attempts exhausted; events are discarded until a probe succeeds
    Degraded,
}

impl ConnectionState {
    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Degraded => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Degraded,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Degraded => write!(f, "degraded"),
        }
    }
}

/// State shared between the emitter handle and its worker
#[derive(Debug, Default)]
pub(crate) struct DeliveryStats {
    state: AtomicU8,
    worker_running: AtomicBool,
    pub(crate) enqueued: AtomicU64,
    pub(crate) delivered: AtomicU64,
    pub(crate) dropped_full: AtomicU64,
    pub(crate) dropped_undeliverable: AtomicU64,
    pub(crate) dropped_degraded: AtomicU64,
    pub(crate) discarded_on_shutdown: AtomicU64,
    pub(crate) retried: AtomicU64,
    pub(crate) connect_attempts: AtomicU64,
}

impl DeliveryStats {
    pub(crate) fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub(crate) fn worker_running(&self) -> bool {
        self.worker_running.load(Ordering::Acquire)
    }

    pub(crate) fn set_worker_running(&self, running: bool) {
        self.worker_running.store(running, Ordering::Release);
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

/// Point-in-time view of the emitter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitterMetrics {
    pub state: ConnectionState,
    pub queue_len: usize,
    pub queue_capacity: usize,
    pub enqueued: u64,
    pub delivered: u64,
    /// Rejected by `record` because the queue was full (or already closed)
    pub dropped_full: u64,
    /// Gave up after the per-event attempt limit
    pub dropped_undeliverable: u64,
    /// Drained while degraded
    pub dropped_degraded: u64,
    pub discarded_on_shutdown: u64,
    pub retried: u64,
    pub connect_attempts: u64,
    pub requests: RunningTotals,
    pub uptime: Duration,
    pub worker_running: bool,
}

impl EmitterMetrics {
    /// Every event that was accepted or rejected and will never be delivered
    pub fn total_dropped(&self) -> u64 {
        self.dropped_full
            + self.dropped_undeliverable
            + self.dropped_degraded
            + self.discarded_on_shutdown
    }

    pub(crate) fn from_stats(
        stats: &DeliveryStats,
        queue_len: usize,
        queue_capacity: usize,
        requests: RunningTotals,
        uptime: Duration,
    ) -> Self {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);

        Self {
            state: stats.state(),
            queue_len,
            queue_capacity,
            enqueued: load(&stats.enqueued),
            delivered: load(&stats.delivered),
            dropped_full: load(&stats.dropped_full),
            dropped_undeliverable: load(&stats.dropped_undeliverable),
            dropped_degraded: load(&stats.dropped_degraded),
            discarded_on_shutdown: load(&stats.discarded_on_shutdown),
            retried: load(&stats.retried),
            connect_attempts: load(&stats.connect_attempts),
            requests,
            uptime,
            worker_running: stats.worker_running(),
        }
    }
}
