//! Metrics collection and exposition.
//!
//! # Metrics
//! - `launcher_requests_total` (counter): requests by status code
//! - `launcher_request_duration_seconds` (histogram): end-to-end latency
//! - `launcher_worker_timeouts_total` (counter): workers killed for exceeding the timeout
//! - `launcher_worker_restarts_total` (counter): respawns by reason
//! - `launcher_workers_ready` (gauge): workers able to take requests

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::LaunchError;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), LaunchError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| LaunchError::Metrics(e.to_string()))?;

    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(status: u16, start: Instant) {
    counter!("launcher_requests_total", "status" => status.to_string()).increment(1);
    histogram!("launcher_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_worker_timeout(worker_id: usize) {
    counter!("launcher_worker_timeouts_total", "worker" => worker_id.to_string()).increment(1);
}

pub fn record_worker_restart(worker_id: usize, reason: &'static str) {
    counter!(
        "launcher_worker_restarts_total",
        "worker" => worker_id.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn set_workers_ready(ready: usize) {
    gauge!("launcher_workers_ready").set(ready as f64);
}
