//! Prometheus metrics exporter
//!
//! HTTP endpoint for Prometheus scraping.

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use super::counters::{MetricsSnapshot, METRICS};
use crate::config::MetricsConfig;

/// Initialize the Prometheus metrics exporter
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(config: &MetricsConfig) -> Result<()> {
    // Register metric descriptions
    describe_counter!("session_connections_total", "Connections ever tracked");
    describe_gauge!("session_connections_connecting", "Connections in the Connecting set");
    describe_gauge!("session_connections_connected", "Connections in the Connected set");
    describe_counter!("session_connections_closed", "Tracked connections that ended");
    describe_counter!("session_connections_rejected", "Incoming connections not admitted");
    describe_counter!("session_messages_received", "Messages dispatched to handlers");
    describe_counter!("session_messages_released", "Message handles returned to the transport");
    describe_counter!("session_bytes_received", "Payload bytes received");
    describe_counter!("session_drain_rounds", "Poll group receive calls");
    describe_counter!("session_handler_failures", "Message handler failures");
    describe_counter!("session_transport_errors", "Transport receive errors");
    describe_counter!("session_buffer_exhausted", "Receive buffer allocation failures");

    // Build and install the Prometheus exporter
    PrometheusBuilder::new()
        .with_http_listener(config.bind_addr)
        .install()?;

    // Start background task to sync atomic counters to metrics crate
    tokio::spawn(sync_metrics_task());

    Ok(())
}

/// Push the growth of one counter since the last sync
fn increment(name: &'static str, current: u64, last: u64) {
    let delta = current.saturating_sub(last);
    if delta > 0 {
        counter!(name).increment(delta);
    }
}

fn sync_snapshot(snapshot: &MetricsSnapshot, last: &MetricsSnapshot) {
    increment("session_connections_total", snapshot.connections_total, last.connections_total);
    gauge!("session_connections_connecting").set(snapshot.connections_connecting as f64);
    gauge!("session_connections_connected").set(snapshot.connections_connected as f64);
    increment("session_connections_closed", snapshot.connections_closed, last.connections_closed);
    increment(
        "session_connections_rejected",
        snapshot.connections_rejected,
        last.connections_rejected,
    );
    increment("session_messages_received", snapshot.messages_received, last.messages_received);
    increment("session_messages_released", snapshot.messages_released, last.messages_released);
    increment("session_bytes_received", snapshot.bytes_received, last.bytes_received);
    increment("session_drain_rounds", snapshot.drain_rounds, last.drain_rounds);
    increment("session_handler_failures", snapshot.handler_failures, last.handler_failures);
    increment("session_transport_errors", snapshot.transport_errors, last.transport_errors);
    increment("session_buffer_exhausted", snapshot.buffer_exhausted, last.buffer_exhausted);
}

/// Background task that periodically syncs our atomic counters to the metrics crate
async fn sync_metrics_task() {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));

    let mut last_snapshot = METRICS.snapshot();

    loop {
        interval.tick().await;

        let snapshot = METRICS.snapshot();
        sync_snapshot(&snapshot, &last_snapshot);
        last_snapshot = snapshot;
    }
}
