//! Atomic counters for hot-path metrics
//!
//! Lock-free counters that can be safely updated from any thread.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics instance
pub static METRICS: Metrics = Metrics::new();

/// Atomic metrics counters
pub struct Metrics {
    // Connection metrics
    pub connections_total: AtomicU64,
    pub connections_connecting: AtomicU64,
    pub connections_connected: AtomicU64,
    pub connections_closed: AtomicU64,
    pub connections_rejected: AtomicU64,

    // Message metrics
    pub messages_received: AtomicU64,
    pub messages_released: AtomicU64,
    pub bytes_received: AtomicU64,
    pub drain_rounds: AtomicU64,

    // Error metrics
    pub handler_failures: AtomicU64,
    pub transport_errors: AtomicU64,
    pub buffer_exhausted: AtomicU64,

    // Pool metrics
    pub buffer_pool_acquires: AtomicU64,
    pub buffer_pool_releases: AtomicU64,
    pub buffer_pool_misses: AtomicU64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_connecting: AtomicU64::new(0),
            connections_connected: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_released: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            drain_rounds: AtomicU64::new(0),
            handler_failures: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
            buffer_exhausted: AtomicU64::new(0),
            buffer_pool_acquires: AtomicU64::new(0),
            buffer_pool_releases: AtomicU64::new(0),
            buffer_pool_misses: AtomicU64::new(0),
        }
    }

    // Connection tracking
    #[inline]
    pub fn connection_tracked(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn connecting_added(&self) {
        self.connections_connecting.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn connecting_removed(&self) {
        let _ = self
            .connections_connecting
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    #[inline]
    pub fn connected_added(&self) {
        self.connections_connected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn connected_removed(&self) {
        let _ = self
            .connections_connected
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    // Message tracking
    #[inline]
    pub fn message_received(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn message_released(&self) {
        self.messages_released.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn drain_round(&self) {
        self.drain_rounds.fetch_add(1, Ordering::Relaxed);
    }

    // Error tracking
    #[inline]
    pub fn handler_failure(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn buffer_exhausted(&self) {
        self.buffer_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    // Buffer pool tracking
    #[inline]
    pub fn buffer_acquired(&self) {
        self.buffer_pool_acquires.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn buffer_released(&self) {
        self.buffer_pool_releases.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn buffer_miss(&self) {
        self.buffer_pool_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_connecting: self.connections_connecting.load(Ordering::Relaxed),
            connections_connected: self.connections_connected.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_released: self.messages_released.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            drain_rounds: self.drain_rounds.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            buffer_exhausted: self.buffer_exhausted.load(Ordering::Relaxed),
            buffer_pool_misses: self.buffer_pool_misses.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics for reporting
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_connecting: u64,
    pub connections_connected: u64,
    pub connections_closed: u64,
    pub connections_rejected: u64,
    pub messages_received: u64,
    pub messages_released: u64,
    pub bytes_received: u64,
    pub drain_rounds: u64,
    pub handler_failures: u64,
    pub transport_errors: u64,
    pub buffer_exhausted: u64,
    pub buffer_pool_misses: u64,
}
