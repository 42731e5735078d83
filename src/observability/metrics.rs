//! Metrics collection and exposition.
//!
//! # Metrics
//! - `state_sync_connections_active` (gauge): registered connections
//! - `state_sync_connections_total` (counter): admitted connections
//! - `state_sync_admission_refused_total` (counter): per-source cap refusals
//! - `state_sync_messages_total` (counter): accepted messages by `type`
//! - `state_sync_nacks_total` (counter): NACKs sent by `code`
//! - `state_sync_heartbeat_evictions_total` (counter)
//! - `state_sync_broadcast_sends_total` (counter): by `result`
//! - `state_sync_bind_failures_total` (counter)
//!
//! Recording is a no-op until `init_metrics` installs the exporter.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with an HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connection_opened(active: usize) {
    counter!("state_sync_connections_total").increment(1);
    gauge!("state_sync_connections_active").set(active as f64);
}

pub fn record_connection_closed(active: usize) {
    gauge!("state_sync_connections_active").set(active as f64);
}

pub fn record_admission_refused() {
    counter!("state_sync_admission_refused_total").increment(1);
}

pub fn record_message(kind: &'static str) {
    counter!("state_sync_messages_total", "type" => kind).increment(1);
}

pub fn record_nack(code: &'static str) {
    counter!("state_sync_nacks_total", "code" => code).increment(1);
}

pub fn record_heartbeat_eviction() {
    counter!("state_sync_heartbeat_evictions_total").increment(1);
}

pub fn record_broadcast(sent: usize, failed: usize) {
    counter!("state_sync_broadcast_sends_total", "result" => "sent").increment(sent as u64);
    counter!("state_sync_broadcast_sends_total", "result" => "failed").increment(failed as u64);
}

pub fn record_bind_failure() {
    counter!("state_sync_bind_failures_total").increment(1);
}
