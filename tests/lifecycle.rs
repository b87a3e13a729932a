//! End-to-end lifecycle tests: resolution, binding, shutdown and orphans.

use std::io::Write;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use materialsuite_launcher::config::{resolve, CliOverrides, EnvOverrides};
use materialsuite_launcher::error::{EXIT_CONFIG, EXIT_OK};
use materialsuite_launcher::{PreforkManager, ProcessManager};
use tokio::process::Command;

mod common;

#[tokio::test]
async fn test_binds_resolved_port_with_resolved_workers() {
    let env = EnvOverrides::from_pairs([("PORT", "28311"), ("WORKERS", "3"), ("TIMEOUT", "20")]);
    let cli = CliOverrides {
        host: Some("127.0.0.1".into()),
        worker_command: Some(vec![common::stub_worker().to_string()]),
        ..Default::default()
    };
    let config = resolve(None, &env, &cli).unwrap().config;

    let manager = PreforkManager::new();
    let handle = manager.start(Arc::new(config)).await.unwrap();
    assert_eq!(handle.local_addr().port(), 28311);

    let mut pids = handle.pool().pids();
    pids.sort_unstable();
    pids.dedup();
    assert_eq!(pids.len(), 3);
    assert!(pids.iter().all(|&pid| common::pid_alive(pid)));
    assert_eq!(handle.pool().ready_count(), 3);

    let (status, _) = common::get_text("http://127.0.0.1:28311/health").await;
    assert_eq!(status, 200);

    manager.stop(handle).await.unwrap();
    assert!(pids.iter().all(|&pid| !common::pid_alive(pid)), "workers left behind");
}

#[tokio::test]
async fn test_stop_lets_in_flight_request_finish() {
    let manager = PreforkManager::new();
    let handle = manager
        .start(Arc::new(common::stub_config(28312, 1, 30)))
        .await
        .unwrap();

    let url = format!("http://{}/sleep/600", handle.local_addr());
    let in_flight = tokio::spawn(async move { common::get_text(&url).await });
    tokio::time::sleep(Duration::from_millis(150)).await;

    manager.stop(handle).await.unwrap();

    let (status, _) = in_flight.await.unwrap();
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_sigterm_exits_cleanly_without_orphans() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[listener]
host = "127.0.0.1"
port = 28313

[workers]
count = 2
command = ["{stub}"]

[admin]
enabled = true
api_key = "lifecycle-key"
bind_address = "127.0.0.1:28314"
"#,
        stub = common::stub_worker()
    )
    .unwrap();

    let mut launcher = Command::new(common::launcher_bin())
        .arg("--config")
        .arg(file.path())
        .env_remove("PORT")
        .env_remove("WORKERS")
        .env_remove("TIMEOUT")
        .env_remove("LAUNCH_PROFILE")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .unwrap();

    let ready = common::eventually(Duration::from_secs(15), || async {
        matches!(
            common::client().get("http://127.0.0.1:28313/").send().await,
            Ok(res) if res.status() == 200
        )
    })
    .await;
    assert!(ready, "launcher never served");

    let output = Command::new(env!("CARGO_BIN_EXE_materialsuite-ctl"))
        .args(["--url", "http://127.0.0.1:28314", "--key", "lifecycle-key", "workers"])
        .output()
        .await
        .unwrap();
    assert!(output.status.success());
    let workers: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let pids: Vec<u32> = workers
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w["pid"].as_u64().unwrap() as u32)
        .collect();
    assert_eq!(pids.len(), 2);

    let launcher_pid = launcher.id().unwrap();
    let killed = std::process::Command::new("kill")
        .args(["-TERM", &launcher_pid.to_string()])
        .status()
        .unwrap();
    assert!(killed.success());

    let status = tokio::time::timeout(Duration::from_secs(15), launcher.wait())
        .await
        .expect("launcher did not exit after SIGTERM")
        .unwrap();
    assert_eq!(status.code(), Some(EXIT_OK as i32));
    assert!(pids.iter().all(|&pid| !common::pid_alive(pid)), "orphaned workers");
}

#[tokio::test]
async fn test_second_launcher_on_taken_port_exits_nonzero() {
    let _occupied = tokio::net::TcpListener::bind("127.0.0.1:28315").await.unwrap();

    let output = tokio::time::timeout(
        Duration::from_secs(15),
        Command::new(common::launcher_bin())
            .args(["--bind", "127.0.0.1:28315", "--workers", "1"])
            .args(["--worker-cmd", common::stub_worker()])
            .env_remove("PORT")
            .env_remove("WORKERS")
            .output(),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(1));
    assert!(!output.stderr.is_empty());
}

#[tokio::test]
async fn test_malformed_environment_exits_with_config_error() {
    let output = Command::new(common::launcher_bin())
        .env("WORKERS", "four")
        .output()
        .await
        .unwrap();

    assert_eq!(output.status.code(), Some(EXIT_CONFIG as i32));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("WORKERS"), "stderr: {stderr}");
}

#[cfg(unix)]
#[tokio::test]
async fn test_non_unicode_environment_is_a_config_error() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let unrelated = Command::new(common::launcher_bin())
        .env("WORKERS", "four")
        .env("UNRELATED_BLOB", OsStr::from_bytes(b"\xff\xfe"))
        .output()
        .await
        .unwrap();
    assert_eq!(unrelated.status.code(), Some(EXIT_CONFIG as i32));

    let mangled = Command::new(common::launcher_bin())
        .env("WORKERS", OsStr::from_bytes(b"4\xff"))
        .output()
        .await
        .unwrap();
    assert_eq!(mangled.status.code(), Some(EXIT_CONFIG as i32));
    let stderr = String::from_utf8_lossy(&mangled.stderr);
    assert!(stderr.contains("WORKERS"), "stderr: {stderr}");
}

#[tokio::test]
async fn test_stop_under_load_answers_every_accepted_request() {
    for round in 0..3 {
        let manager = PreforkManager::new();
        let handle = manager
            .start(Arc::new(common::stub_config(28316, 2, 30)))
            .await
            .unwrap();
        let url = format!("http://{}/health", handle.local_addr());

        let clients: Vec<_> = (0..16)
            .map(|_| {
                let url = url.clone();
                tokio::spawn(async move {
                    let client = common::client();
                    let mut statuses = Vec::new();
                    // Runs until the listener goes away.
                    while let Ok(res) = client.get(&url).send().await {
                        statuses.push(res.status().as_u16());
                    }
                    statuses
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(100)).await;
        manager.stop(handle).await.unwrap();

        let mut answered = 0;
        for client in clients {
            for status in client.await.unwrap() {
                assert_eq!(status, 200, "round {round}: request failed during shutdown");
                answered += 1;
            }
        }
        assert!(answered > 0, "round {round}: nothing was served");
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_stop_kills_processes_forked_by_workers() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("forked.pid");

    let mut config = common::stub_config(28317, 1, 30);
    config.workers.command = vec![
        "sh".into(),
        "-c".into(),
        format!(
            "sleep 300 & echo $! > {}; exec {}",
            pid_file.display(),
            common::stub_worker()
        ),
    ];

    let manager = PreforkManager::new();
    let handle = manager.start(Arc::new(config)).await.unwrap();

    let forked: u32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert!(common::pid_running(forked));

    manager.stop(handle).await.unwrap();

    let gone = common::eventually(Duration::from_secs(5), || async move {
        !common::pid_running(forked)
    })
    .await;
    assert!(gone, "process forked by a worker survived stop");
}
