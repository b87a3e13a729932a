use axum::{extract::State, Json};
use serde::Serialize;

use super::AdminState;
use crate::workers::WorkerSnapshot;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub profile: &'static str,
    pub app: String,
    pub address: String,
    pub workers: usize,
    pub ready: usize,
    /// `None` when requests are not time-limited.
    pub timeout_secs: Option<u64>,
    pub uptime_secs: u64,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let ready = state.pool.ready_count();
    let workers = state.pool.len();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if ready == workers { "operational" } else { "degraded" },
        profile: state.config.profile.as_str(),
        app: state.config.app.clone(),
        address: state.public_addr.to_string(),
        workers,
        ready,
        timeout_secs: state.config.request_timeout().map(|t| t.as_secs()),
        uptime_secs: state.started.elapsed().as_secs(),
    })
}

pub async fn get_workers(State(state): State<AdminState>) -> Json<Vec<WorkerSnapshot>> {
    Json(state.pool.snapshot())
}
