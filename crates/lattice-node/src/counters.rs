//! Per-node traffic counters.
//!
//! Sending, relaying, and receiving all run concurrently, so every
//! mutation goes through one mutex. Payload sums accumulate in i64 —
//! individual payloads span the full i32 range and overflow i32 after
//! a handful of packets.

use std::sync::Mutex;

use lattice_core::TrafficSummary;

#[derive(Default)]
struct Inner {
    sent: i32,
    relayed: i32,
    received: i32,
    sent_sum: i64,
    received_sum: i64,
}

#[derive(Default)]
pub struct TrafficCounters {
    inner: Mutex<Inner>,
}

impl TrafficCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero everything. Called at the start of each task round.
    pub fn reset(&self) {
        *self.inner.lock().unwrap() = Inner::default();
    }

    pub fn record_sent(&self, payload: i32) {
        let mut inner = self.inner.lock().unwrap();
        inner.sent += 1;
        inner.sent_sum += i64::from(payload);
    }

    pub fn record_relayed(&self) {
        self.inner.lock().unwrap().relayed += 1;
    }

    pub fn record_received(&self, payload: i32) {
        let mut inner = self.inner.lock().unwrap();
        inner.received += 1;
        inner.received_sum += i64::from(payload);
    }

    pub fn snapshot(&self, node_id: i32) -> TrafficSummary {
        let inner = self.inner.lock().unwrap();
        TrafficSummary {
            node_id,
            sent: inner.sent,
            relayed: inner.relayed,
            sent_sum: inner.sent_sum,
            received: inner.received,
            received_sum: inner.received_sum,
        }
    }
}
