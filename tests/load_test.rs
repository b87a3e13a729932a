//! Load testing for the launcher: concurrency is bounded by the worker count.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use materialsuite_launcher::{PreforkManager, ProcessManager};

mod common;

#[tokio::test]
async fn test_requests_spread_one_per_worker() {
    let workers = 4;
    let manager = PreforkManager::new();
    let handle = manager
        .start(Arc::new(common::stub_config(28321, workers, 30)))
        .await
        .unwrap();

    let concurrency = 40;
    let url = format!("http://{}/sleep/50", handle.local_addr());
    let client = common::client();

    let start = Instant::now();
    let tasks: Vec<_> = (0..concurrency)
        .map(|_| {
            let client = client.clone();
            let url = url.clone();
            tokio::spawn(async move {
                let res = client.get(&url).send().await.unwrap();
                (res.status().as_u16(), res.text().await.unwrap())
            })
        })
        .collect();

    let mut pids = HashSet::new();
    for task in tasks {
        let (status, pid) = task.await.unwrap();
        assert_eq!(status, 200);
        pids.insert(pid);
    }
    let elapsed = start.elapsed();

    println!("{concurrency} requests over {workers} workers in {elapsed:?}");
    assert_eq!(pids.len(), workers);
    // 40 requests x 50ms, never more than 4 at once.
    assert!(elapsed >= Duration::from_millis(450), "workers overlapped requests: {elapsed:?}");

    let served: u64 = handle.pool().snapshot().iter().map(|w| w.requests_served).sum();
    assert_eq!(served, concurrency as u64);

    manager.stop(handle).await.unwrap();
}
