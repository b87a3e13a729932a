//! Admin API.
//!
//! Read-only view of the running process group, served on its own bind
//! address and guarded by a bearer key.

pub mod auth;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::config::LaunchConfig;
use crate::workers::WorkerPool;

use self::auth::admin_auth_middleware;
use self::handlers::{get_status, get_workers};

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub config: Arc<LaunchConfig>,
    pub pool: Arc<WorkerPool>,
    pub public_addr: SocketAddr,
    pub started: Instant,
}

impl AdminState {
    pub fn new(config: Arc<LaunchConfig>, pool: Arc<WorkerPool>, public_addr: SocketAddr) -> Self {
        Self {
            config,
            pool,
            public_addr,
            started: Instant::now(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/workers", get(get_workers))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

/// Serve the admin API until shutdown is broadcast.
pub async fn serve(
    listener: TcpListener,
    state: AdminState,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin API listening");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}
