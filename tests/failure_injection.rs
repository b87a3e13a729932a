//! Failure injection tests for the launcher.

use std::sync::Arc;
use std::time::Duration;

use materialsuite_launcher::error::{EXIT_APP_LOAD, EXIT_FAILURE};
use materialsuite_launcher::net::{Listener, ListenerError};
use materialsuite_launcher::{LaunchError, PreforkManager, ProcessManager};

mod common;

#[tokio::test]
async fn test_timed_out_worker_is_replaced() {
    let config = Arc::new(common::stub_config(28301, 1, 1));
    let manager = PreforkManager::new();
    let handle = manager.start(config).await.expect("launcher should start");
    let base = format!("http://{}", handle.local_addr());

    let (status, first_pid) = common::get_text(&format!("{base}/pid")).await;
    assert_eq!(status, 200);
    let first_pid: u32 = first_pid.parse().unwrap();

    let started = std::time::Instant::now();
    let (status, _) = common::get_text(&format!("{base}/sleep/5000")).await;
    assert_eq!(status, 504);
    assert!(started.elapsed() < Duration::from_secs(4), "timeout was not enforced");

    let pool = Arc::clone(handle.pool());
    let replaced = common::eventually(Duration::from_secs(10), || {
        let pool = Arc::clone(&pool);
        async move { pool.ready_count() == 1 && pool.pids() != vec![first_pid] }
    })
    .await;
    assert!(replaced, "worker was not respawned");
    assert!(!common::pid_alive(first_pid), "timed-out worker still running");

    // Listener stayed up and the new worker serves.
    let (status, second_pid) = common::get_text(&format!("{base}/pid")).await;
    assert_eq!(status, 200);
    assert_ne!(second_pid.parse::<u32>().unwrap(), first_pid);
    assert!(handle.pool().snapshot()[0].restarts >= 1);

    manager.stop(handle).await.unwrap();
}

#[tokio::test]
async fn test_app_load_failure_aborts_startup() {
    let mut config = common::stub_config(28302, 2, 30);
    config.workers.env.insert("STUB_BOOT_FAIL".into(), "1".into());

    let err = match PreforkManager::new().start(Arc::new(config)).await {
        Ok(_) => panic!("startup should fail when the app cannot load"),
        Err(e) => e,
    };
    assert!(matches!(err, LaunchError::AppLoad(_)), "got {err}");
    assert_eq!(err.exit_code(), EXIT_APP_LOAD);

    // Listener was released with everything else.
    let rebound = Listener::bind("127.0.0.1:28302").await;
    assert!(rebound.is_ok());
}

#[tokio::test]
async fn test_second_instance_on_same_port_fails() {
    let manager = PreforkManager::new();
    let first = manager
        .start(Arc::new(common::stub_config(28303, 1, 30)))
        .await
        .expect("first instance should start");

    let err = match manager.start(Arc::new(common::stub_config(28303, 1, 30))).await {
        Ok(_) => panic!("second instance should not bind"),
        Err(e) => e,
    };
    assert!(matches!(err, LaunchError::Listener(ListenerError::Bind { .. })), "got {err}");
    assert_eq!(err.exit_code(), EXIT_FAILURE);

    // The first one is unaffected.
    let (status, body) = common::get_text(&format!("http://{}/", first.local_addr())).await;
    assert_eq!(status, 200);
    assert_eq!(body, "worker 0");

    manager.stop(first).await.unwrap();
}

#[tokio::test]
async fn test_crashed_worker_is_respawned() {
    let manager = PreforkManager::new();
    let handle = manager
        .start(Arc::new(common::stub_config(28304, 1, 30)))
        .await
        .unwrap();
    let base = format!("http://{}", handle.local_addr());
    let first_pid = handle.pool().pids()[0];

    let (status, body) = common::get_text(&format!("{base}/exit")).await;
    assert_eq!((status, body.as_str()), (200, "bye"));

    let pool = Arc::clone(handle.pool());
    let respawned = common::eventually(Duration::from_secs(10), || {
        let pool = Arc::clone(&pool);
        async move { pool.ready_count() == 1 && pool.pids().first() != Some(&first_pid) }
    })
    .await;
    assert!(respawned);

    let (status, _) = common::get_text(&format!("{base}/")).await;
    assert_eq!(status, 200);

    manager.stop(handle).await.unwrap();
}

#[tokio::test]
async fn test_zero_timeout_is_unbounded() {
    let manager = PreforkManager::new();
    let handle = manager
        .start(Arc::new(common::stub_config(28305, 1, 0)))
        .await
        .unwrap();

    let (status, _) = common::get_text(&format!("http://{}/sleep/1500", handle.local_addr())).await;
    assert_eq!(status, 200);

    manager.stop(handle).await.unwrap();
}

#[tokio::test]
async fn test_missing_worker_program_is_app_load_failure() {
    let mut config = common::stub_config(28306, 1, 30);
    config.workers.command = vec!["/nonexistent/materialsuite-worker".into()];

    let err = match PreforkManager::new().start(Arc::new(config)).await {
        Ok(_) => panic!("startup should fail"),
        Err(e) => e,
    };
    assert_eq!(err.exit_code(), EXIT_APP_LOAD);
}

#[tokio::test]
async fn test_slot_that_stops_booting_halts_launcher() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("broken");

    let mut config = common::stub_config(28307, 1, 30);
    config.workers.max_boot_failures = 1;
    config
        .workers
        .env
        .insert("STUB_BOOT_FAIL_IF_EXISTS".into(), marker.display().to_string());

    let manager = PreforkManager::new();
    let mut handle = manager.start(Arc::new(config)).await.unwrap();

    // From now on every respawn fails to load.
    std::fs::write(&marker, b"").unwrap();
    let (status, _) = common::get_text(&format!("http://{}/exit", handle.local_addr())).await;
    assert_eq!(status, 200);

    let err = tokio::time::timeout(Duration::from_secs(10), handle.wait())
        .await
        .expect("launcher should halt")
        .unwrap_err();
    assert!(matches!(err, LaunchError::AppLoad(_)), "got {err}");
    assert_eq!(err.exit_code(), EXIT_APP_LOAD);

    manager.stop(handle).await.unwrap();
}
