//! Metrics collection and exposition.
//!
//! # Metrics
//! - `sdn_lb_packet_in_total` (counter): table misses seen by the controller
//! - `sdn_lb_flows_assigned_total` (counter): new bindings, by backend
//! - `sdn_lb_packets_dropped_total` (counter): drops, by reason
//! - `sdn_lb_duplicate_miss_total` (counter): misses collapsed onto a binding
//! - `sdn_lb_flows_removed_total` (counter): entry pairs removed, by reason
//! - `sdn_lb_flow_table_entries` (gauge): installed entries
//! - `sdn_lb_backend_active_flows` (gauge): bindings held per backend
//! - `sdn_lb_backend_alive` (gauge): 1=alive, 0=down

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::openflow::RemovalReason;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_packet_in() {
    metrics::counter!("sdn_lb_packet_in_total").increment(1);
}

pub fn record_flow_assigned(backend: &str) {
    metrics::counter!("sdn_lb_flows_assigned_total", "backend" => backend.to_string()).increment(1);
}

pub fn record_packet_dropped(reason: &'static str) {
    metrics::counter!("sdn_lb_packets_dropped_total", "reason" => reason).increment(1);
}

pub fn record_duplicate_miss() {
    metrics::counter!("sdn_lb_duplicate_miss_total").increment(1);
}

pub fn record_flow_removed(reason: RemovalReason) {
    metrics::counter!("sdn_lb_flows_removed_total", "reason" => reason.as_str()).increment(1);
}

pub fn record_flow_table_size(entries: usize) {
    metrics::gauge!("sdn_lb_flow_table_entries").set(entries as f64);
}

pub fn record_backend_active_flows(backend: &str, flows: usize) {
    metrics::gauge!("sdn_lb_backend_active_flows", "backend" => backend.to_string()).set(flows as f64);
}

/// Record backend liveness (1 = alive, 0 = down).
pub fn record_backend_alive(backend: &str, alive: bool) {
    let value = if alive { 1.0 } else { 0.0 };
    metrics::gauge!("sdn_lb_backend_alive", "backend" => backend.to_string()).set(value);
}
