//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use materialsuite_launcher::config::LaunchConfig;

/// Worker binary built alongside the tests.
pub fn stub_worker() -> &'static str {
    env!("CARGO_BIN_EXE_materialsuite-stub-worker")
}

pub fn launcher_bin() -> &'static str {
    env!("CARGO_BIN_EXE_materialsuite-launcher")
}

/// Loopback-only config that runs `workers` stub workers on `port`.
pub fn stub_config(port: u16, workers: usize, timeout_secs: u64) -> LaunchConfig {
    let mut config = LaunchConfig::default();
    config.listener.host = "127.0.0.1".into();
    config.listener.port = port;
    config.listener.queue_timeout_secs = 10;
    config.workers.count = workers;
    config.workers.command = vec![stub_worker().to_string()];
    config.workers.boot_timeout_secs = 10;
    config.workers.graceful_timeout_secs = 5;
    config.workers.restart_backoff_base_ms = 10;
    config.workers.restart_backoff_max_ms = 100;
    config.timeouts.request_secs = timeout_secs;
    config
}

/// Client that never reuses connections and ignores proxy env vars.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap()
}

pub async fn get_text(url: &str) -> (u16, String) {
    let res = client().get(url).send().await.expect("launcher unreachable");
    let status = res.status().as_u16();
    (status, res.text().await.unwrap())
}

/// Poll `check` every 50ms until it holds or `limit` passes.
pub async fn eventually<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Whether a process with `pid` exists (and has not been reaped).
pub fn pid_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Whether `pid` is running: present and not a zombie. Reads procfs, so it
/// also works for processes this test did not spawn.
#[cfg(target_os = "linux")]
pub fn pid_running(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_some_and(|state| state != "Z"),
        Err(_) => false,
    }
}
