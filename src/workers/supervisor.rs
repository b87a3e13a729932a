//! Per-slot worker supervision.
//!
//! One supervisor task owns one slot for the lifetime of the launcher:
//!
//! ```text
//! spawn → readiness probe → Idle ⇄ Busy ─┬─ process exits      → backoff → spawn
//!                                         ├─ restart requested  → kill    → spawn
//!                                         └─ shutdown           → retire  → drain → kill → Stopped
//! ```
//!
//! The first boot is reported to the manager, which refuses to start unless
//! every slot comes up. Later boot failures are retried with backoff until
//! `max_boot_failures` is exceeded, at which point the launcher halts.

use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Instant};

use crate::config::LaunchConfig;
use crate::health::wait_until_ready;
use crate::observability::metrics;
use crate::resilience::{deadline_after, respawn_delay};
use crate::workers::pool::WorkerPool;
use crate::workers::process::{allocate_port, spawn_worker};
use crate::workers::worker::{Worker, WorkerState};
use crate::workers::WorkerError;

/// A process that stays up this long resets the crash backoff.
const STABLE_AFTER: Duration = Duration::from_secs(10);

const DRAIN_POLL: Duration = Duration::from_millis(25);

/// Reports from slot supervisors to the manager.
#[derive(Debug)]
pub enum SupervisorEvent {
    /// The slot's first process is ready.
    Booted { worker_id: usize },
    /// The slot's first process never became ready.
    StartupFailed { worker_id: usize, error: WorkerError },
    /// The slot kept failing to boot after startup; the launcher must stop.
    Halted { worker_id: usize, error: WorkerError },
}

enum Outcome {
    Exited(ExitStatus),
    RestartRequested,
    Shutdown,
}

enum BootError {
    Failed(WorkerError),
    Shutdown,
}

/// Keeps one worker slot populated.
pub struct SlotSupervisor {
    worker: Arc<Worker>,
    pool: Arc<WorkerPool>,
    config: Arc<LaunchConfig>,
    shutdown: broadcast::Receiver<()>,
    events: mpsc::UnboundedSender<SupervisorEvent>,
}

impl SlotSupervisor {
    pub fn new(
        worker: Arc<Worker>,
        pool: Arc<WorkerPool>,
        config: Arc<LaunchConfig>,
        shutdown: broadcast::Receiver<()>,
        events: mpsc::UnboundedSender<SupervisorEvent>,
    ) -> Self {
        Self {
            worker,
            pool,
            config,
            shutdown,
            events,
        }
    }

    pub async fn run(mut self) {
        let worker_id = self.worker.id;
        let mut announced = false;
        let mut boot_failures: u32 = 0;
        let mut crash_streak: u32 = 0;

        loop {
            let mut child = match self.boot().await {
                Ok(child) => {
                    boot_failures = 0;
                    if !announced {
                        announced = true;
                        let _ = self.events.send(SupervisorEvent::Booted { worker_id });
                    }
                    child
                }
                Err(BootError::Shutdown) => break,
                Err(BootError::Failed(error)) => {
                    self.worker.mark_dead();
                    if !announced {
                        let _ = self
                            .events
                            .send(SupervisorEvent::StartupFailed { worker_id, error });
                        break;
                    }

                    boot_failures += 1;
                    if boot_failures > self.config.workers.max_boot_failures {
                        tracing::error!(
                            worker_id,
                            failures = boot_failures,
                            error = %error,
                            "Worker keeps failing to boot, halting"
                        );
                        let _ = self.events.send(SupervisorEvent::Halted { worker_id, error });
                        break;
                    }

                    tracing::warn!(worker_id, attempt = boot_failures, error = %error, "Worker failed to boot");
                    if !self.pause(boot_failures).await {
                        break;
                    }
                    continue;
                }
            };

            let started = Instant::now();
            self.publish_ready();

            match self.watch(&mut child).await {
                Outcome::Shutdown => {
                    self.drain(&mut child).await;
                    break;
                }
                Outcome::RestartRequested => {
                    tracing::warn!(
                        worker_id,
                        pid = ?child.id(),
                        generation = self.worker.generation(),
                        "Killing worker"
                    );
                    reap(worker_id, &mut child).await;
                    self.worker.mark_dead();
                    self.worker.record_restart();
                    metrics::record_worker_restart(worker_id, "timeout");
                    crash_streak = 0;
                }
                Outcome::Exited(status) => {
                    #[cfg(unix)]
                    if let Some(pid) = self.worker.pid() {
                        kill_group(worker_id, pid).await;
                    }
                    self.worker.mark_dead();
                    self.worker.record_restart();
                    metrics::record_worker_restart(worker_id, "exited");
                    crash_streak = if started.elapsed() >= STABLE_AFTER {
                        1
                    } else {
                        crash_streak.saturating_add(1)
                    };
                    tracing::warn!(
                        worker_id,
                        status = %status,
                        generation = self.worker.generation(),
                        "Worker exited unexpectedly"
                    );
                }
            }

            self.publish_ready();
            if !self.pause(crash_streak).await {
                break;
            }
        }

        self.worker.mark_stopped();
        self.publish_ready();
        tracing::debug!(worker_id, "Slot supervisor stopped");
    }

    /// Spawn a process and wait for it to accept connections.
    async fn boot(&mut self) -> Result<Child, BootError> {
        let worker_id = self.worker.id;
        let port = allocate_port().map_err(BootError::Failed)?;
        let mut child = spawn_worker(&self.config, worker_id, port).map_err(BootError::Failed)?;
        let generation = self.worker.mark_booting(port, child.id());
        let addr = self.worker.addr();

        let boot_timeout = self.config.workers.boot_timeout();
        let ready = tokio::select! {
            result = wait_until_ready(worker_id, &mut child, addr, boot_timeout) => Some(result),
            _ = self.shutdown.recv() => None,
        };

        let Some(ready) = ready else {
            reap(worker_id, &mut child).await;
            self.worker.mark_dead();
            return Err(BootError::Shutdown);
        };

        match ready {
            Ok(()) => {
                self.worker.mark_ready();
                tracing::info!(
                    worker_id,
                    pid = ?child.id(),
                    port,
                    generation,
                    "Booted worker"
                );
                Ok(child)
            }
            Err(error) => {
                reap(worker_id, &mut child).await;
                Err(BootError::Failed(error))
            }
        }
    }

    /// Wait for the process to exit, be condemned, or for shutdown.
    async fn watch(&mut self, child: &mut Child) -> Outcome {
        let generation = self.worker.generation();
        tokio::select! {
            status = child.wait() => match status {
                Ok(status) => Outcome::Exited(status),
                Err(e) => {
                    tracing::error!(worker_id = self.worker.id, error = %e, "Failed to wait on worker");
                    Outcome::RestartRequested
                }
            },
            _ = self.worker.restart_requested(generation) => Outcome::RestartRequested,
            _ = self.shutdown.recv() => Outcome::Shutdown,
        }
    }

    /// Take the slot out of rotation, let an in-flight request finish
    /// (bounded), then stop the process.
    async fn drain(&self, child: &mut Child) {
        let worker_id = self.worker.id;
        let deadline = deadline_after(self.config.workers.graceful_timeout());

        while !self.worker.retire() {
            match self.worker.state() {
                WorkerState::Busy if Instant::now() < deadline => time::sleep(DRAIN_POLL).await,
                WorkerState::Busy => {
                    tracing::warn!(worker_id, "Graceful timeout expired with a request in flight");
                    break;
                }
                // Released between the two loads; retire it next time round.
                WorkerState::Idle => continue,
                _ => break,
            }
        }
        self.worker.mark_stopped();

        reap(worker_id, child).await;
        tracing::info!(worker_id, "Worker stopped");
    }

    /// Sleep the backoff for `attempt`; false if shutdown arrived meanwhile.
    async fn pause(&mut self, attempt: u32) -> bool {
        let delay = respawn_delay(
            attempt,
            self.config.workers.restart_backoff_base_ms,
            self.config.workers.restart_backoff_max_ms,
        );
        if delay.is_zero() {
            return true;
        }

        tracing::debug!(worker_id = self.worker.id, delay = ?delay, "Delaying respawn");
        tokio::select! {
            _ = time::sleep(delay) => true,
            _ = self.shutdown.recv() => false,
        }
    }

    fn publish_ready(&self) {
        metrics::set_workers_ready(self.pool.ready_count());
    }
}

/// Kill the process (and anything it forked) if still running and collect
/// its exit status.
async fn reap(worker_id: usize, child: &mut Child) {
    let pid = child.id();
    let exited = match child.try_wait() {
        Ok(status) => status.is_some(),
        Err(e) => {
            tracing::warn!(worker_id, error = %e, "Failed to poll worker");
            false
        }
    };

    #[cfg(unix)]
    if let Some(pid) = pid {
        kill_group(worker_id, pid).await;
    }
    if exited {
        return;
    }

    if let Err(e) = child.start_kill() {
        tracing::warn!(worker_id, error = %e, "Failed to kill worker");
    }
    if let Err(e) = child.wait().await {
        tracing::warn!(worker_id, error = %e, "Failed to reap worker");
    }
}

/// SIGKILL the process group led by a worker. Workers are spawned as group
/// leaders, so this reaches grandchildren a wrapper or master process left.
#[cfg(unix)]
async fn kill_group(worker_id: usize, pgid: u32) {
    use std::process::Stdio;

    let status = tokio::process::Command::new("kill")
        .args(["-KILL", "--", &format!("-{pgid}")])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match status {
        Ok(status) if status.success() => {
            tracing::debug!(worker_id, pgid, "Killed worker process group")
        }
        // Nothing left in the group.
        Ok(_) => {}
        Err(e) => tracing::warn!(worker_id, error = %e, "Failed to signal worker process group"),
    }
}
