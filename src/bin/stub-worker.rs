//! Minimal worker used by the integration tests and for local smoke runs.
//!
//! Listens on `$HOST:$PORT` like a real worker would. `STUB_BOOT_FAIL=1`
//! makes it exit before binding (an application that cannot be loaded), as
//! does an existing file at `STUB_BOOT_FAIL_IF_EXISTS`;
//! `STUB_BOOT_DELAY_MS` delays the bind.

use std::time::Duration;

use axum::{body::Bytes, extract::Path, routing::get, routing::post, Router};
use tokio::net::TcpListener;

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::io::Result<()> {
    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port = std::env::var("PORT").unwrap_or_else(|_| "8000".into());
    let worker_id = std::env::var("WORKER_ID").unwrap_or_else(|_| "0".into());

    let marker_exists = std::env::var_os("STUB_BOOT_FAIL_IF_EXISTS")
        .is_some_and(|path| std::path::Path::new(&path).exists());
    if marker_exists || std::env::var("STUB_BOOT_FAIL").is_ok_and(|v| v == "1") {
        eprintln!("stub-worker {worker_id}: cannot import application");
        std::process::exit(3);
    }
    if let Some(delay) = std::env::var("STUB_BOOT_DELAY_MS")
        .ok()
        .and_then(|v| v.parse().ok())
    {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let app = Router::new()
        .route(
            "/",
            get(move || {
                let id = worker_id.clone();
                async move { format!("worker {id}") }
            }),
        )
        .route("/pid", get(|| async { std::process::id().to_string() }))
        .route("/health", get(|| async { "ok" }))
        .route("/sleep/{ms}", get(sleep))
        .route("/exit", get(exit))
        .route("/echo", post(|body: Bytes| async move { body }));

    let listener = TcpListener::bind(format!("{host}:{port}")).await?;
    axum::serve(listener, app).await
}

async fn sleep(Path(ms): Path<u64>) -> String {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    std::process::id().to_string()
}

async fn exit() -> &'static str {
    tokio::spawn(async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        std::process::exit(1);
    });
    "bye"
}
