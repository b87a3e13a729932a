//! Worker readiness probing.
//!
//! # Responsibilities
//! - Poll a freshly spawned worker until it accepts TCP connections
//! - Detect a worker that exits before it is ready (application failed to load)
//! - Bound the wait by the configured boot timeout

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::process::Child;
use tokio::time::{self, Instant};

use crate::resilience::deadline_after;
use crate::workers::WorkerError;

const PROBE_INTERVAL: Duration = Duration::from_millis(50);
const CONNECT_TIMEOUT: Duration = Duration::from_millis(250);

/// Wait until `child` accepts connections on `addr`.
pub async fn wait_until_ready(
    worker_id: usize,
    child: &mut Child,
    addr: SocketAddr,
    boot_timeout: Duration,
) -> Result<(), WorkerError> {
    let deadline = deadline_after(boot_timeout);

    loop {
        if let Some(status) = child.try_wait().map_err(WorkerError::Wait)? {
            return Err(WorkerError::ExitedDuringBoot {
                worker_id,
                status: status.to_string(),
            });
        }

        match time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => {
                tracing::debug!(worker_id, addr = %addr, "Worker accepting connections");
                return Ok(());
            }
            Ok(Err(e)) => {
                tracing::trace!(worker_id, addr = %addr, error = %e, "Worker not ready yet");
            }
            Err(_) => {
                tracing::trace!(worker_id, addr = %addr, "Readiness probe timed out");
            }
        }

        if Instant::now() >= deadline {
            return Err(WorkerError::BootTimeout {
                worker_id,
                timeout_secs: boot_timeout.as_secs(),
            });
        }
        time::sleep(PROBE_INTERVAL).await;
    }
}
