//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create the Axum router that fronts the worker pool
//! - Wire up middleware (request ID, tracing, body limit)
//! - Serve on the arbiter's listener until shutdown is broadcast
//! - Hand each request to exactly one idle worker
//! - Enforce the per-request timeout and condemn workers that exceed it
//! - Observability (metrics, correlation IDs)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, State},
    http::{response::Parts, Request},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use http_body_util::BodyExt;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::config::LaunchConfig;
use crate::http::request::{prepare_upstream, request_id_layer, RequestIdExt, X_REQUEST_ID};
use crate::http::response::{strip_hop_by_hop, DispatchFailure};
use crate::observability::metrics;
use crate::resilience::with_deadline;
use crate::workers::{WorkerGuard, WorkerPool};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<WorkerPool>,
    pub client: Client<HttpConnector, Body>,
    /// `None` means a worker may take as long as it likes.
    pub request_timeout: Option<Duration>,
    pub queue_timeout: Duration,
}

/// HTTP front end of the arbiter.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: Arc<LaunchConfig>, pool: Arc<WorkerPool>) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        connector.set_connect_timeout(Some(Duration::from_secs(5)));

        // Workers can be killed at any time; never reuse a pooled connection.
        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(0)
            .build(connector);

        let state = AppState {
            pool,
            client,
            request_timeout: config.request_timeout(),
            queue_timeout: config.listener.queue_timeout(),
        };

        Self {
            router: Self::build_router(&config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &LaunchConfig, state: AppState) -> Router {
        Router::new()
            .route("/", any(dispatch))
            .route("/{*path}", any(dispatch))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }))
            .layer(middleware::from_fn(request_id_layer))
    }

    /// Serve on `listener` until a shutdown is broadcast, then let in-flight
    /// requests finish.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

enum ExchangeError {
    Request(hyper_util::client::legacy::Error),
    Body(hyper::Error),
}

/// Forward one request to one worker.
async fn dispatch(
    State(state): State<AppState>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let request_id = request
        .request_id()
        .map(|id| id.to_string())
        .unwrap_or_default();

    let Some(worker) = state.pool.acquire(state.queue_timeout).await else {
        tracing::warn!(
            request_id = %request_id,
            waited = ?state.queue_timeout,
            "No idle worker"
        );
        let failure = DispatchFailure::NoWorker;
        metrics::record_request(failure.status().as_u16(), start);
        return failure.into_response();
    };

    prepare_upstream(&mut request, worker.addr(), client_addr);

    // The exchange runs detached so a client hanging up cannot release the
    // worker while it is still busy with the request.
    let response = match tokio::spawn(forward(state.clone(), worker, request, request_id.clone())).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Dispatch task failed");
            DispatchFailure::Upstream.into_response()
        }
    };

    metrics::record_request(response.status().as_u16(), start);
    response
}

/// Run the exchange with `worker` under the request deadline.
async fn forward(
    state: AppState,
    worker: WorkerGuard,
    request: Request<Body>,
    request_id: String,
) -> Response {
    let worker_id = worker.id;
    let worker_pid = worker.pid();

    tracing::debug!(
        request_id = %request_id,
        worker_id,
        pid = ?worker_pid,
        method = %request.method(),
        path = %request.uri().path(),
        "Dispatching request"
    );

    let exchange = async {
        let response = state
            .client
            .request(request)
            .await
            .map_err(ExchangeError::Request)?;
        let (parts, body) = response.into_parts();
        let bytes = body.collect().await.map_err(ExchangeError::Body)?.to_bytes();
        Ok::<(Parts, Bytes), ExchangeError>((parts, bytes))
    };

    match with_deadline(state.request_timeout, exchange).await {
        Ok(Ok((mut parts, bytes))) => {
            worker.record_served();
            strip_hop_by_hop(&mut parts.headers);
            Response::from_parts(parts, Body::from(bytes))
        }
        Ok(Err(ExchangeError::Request(e))) => {
            if e.is_connect() {
                worker.request_restart();
            }
            tracing::error!(request_id = %request_id, worker_id, error = %e, "Worker request failed");
            DispatchFailure::Upstream.into_response()
        }
        Ok(Err(ExchangeError::Body(e))) => {
            tracing::error!(request_id = %request_id, worker_id, error = %e, "Worker response broken");
            DispatchFailure::Upstream.into_response()
        }
        Err(exceeded) => {
            tracing::error!(
                request_id = %request_id,
                worker_id,
                pid = ?worker_pid,
                timeout = ?exceeded.0,
                "Worker timed out, killing it"
            );
            worker.request_restart();
            metrics::record_worker_timeout(worker_id);
            DispatchFailure::Timeout.into_response()
        }
    }
}
