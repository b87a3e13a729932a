//! Worker slot abstraction.
//!
//! # Responsibilities
//! - Represent one worker position whose process may be replaced over time
//! - Track lifecycle state (Booting → Idle ⇄ Busy → Dead, Idle → Stopped on shutdown)
//! - Hand out exclusive, RAII-released claims so a worker serves one request at a time
//! - Carry the restart request from the dispatcher to the slot supervisor

use std::net::{Ipv4Addr, SocketAddr};
use std::ops::Deref;
use std::sync::atomic::{AtomicU16, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Notify;

/// Worker lifecycle state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Booting = 0,
    Idle = 1,
    Busy = 2,
    Dead = 3,
    Stopped = 4,
}

impl From<u8> for WorkerState {
    fn from(val: u8) -> Self {
        match val {
            1 => WorkerState::Idle,
            2 => WorkerState::Busy,
            3 => WorkerState::Dead,
            4 => WorkerState::Stopped,
            _ => WorkerState::Booting,
        }
    }
}

/// A single worker slot.
#[derive(Debug)]
pub struct Worker {
    /// Slot index, stable across respawns.
    pub id: usize,
    /// Loopback port of the current process (0 before the first spawn).
    port: AtomicU16,
    /// PID of the current process (0 when none).
    pid: AtomicU32,
    state: AtomicU8,
    /// Number of processes spawned into this slot.
    generation: AtomicU64,
    requests_served: AtomicU64,
    restarts: AtomicU64,
    /// Generation the dispatcher asked to replace (0 = none).
    condemned: AtomicU64,
    /// Wakes the slot supervisor when the dispatcher gives up on the process.
    restart: Notify,
    /// Shared with the pool; signalled whenever this slot becomes idle.
    idle: Arc<Notify>,
}

impl Worker {
    pub fn new(id: usize, idle: Arc<Notify>) -> Self {
        Self {
            id,
            port: AtomicU16::new(0),
            pid: AtomicU32::new(0),
            state: AtomicU8::new(WorkerState::Booting as u8),
            generation: AtomicU64::new(0),
            requests_served: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
            condemned: AtomicU64::new(0),
            restart: Notify::new(),
            idle,
        }
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from(self.state.load(Ordering::Acquire))
    }

    pub fn port(&self) -> u16 {
        self.port.load(Ordering::Acquire)
    }

    pub fn pid(&self) -> Option<u32> {
        match self.pid.load(Ordering::Acquire) {
            0 => None,
            pid => Some(pid),
        }
    }

    /// Address of the current process.
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.port()))
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    pub fn requests_served(&self) -> u64 {
        self.requests_served.load(Ordering::Relaxed)
    }

    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::Relaxed)
    }

    // --- Supervisor side ---

    /// Record a freshly spawned process. Returns its generation.
    pub fn mark_booting(&self, port: u16, pid: Option<u32>) -> u64 {
        self.port.store(port, Ordering::Release);
        self.pid.store(pid.unwrap_or(0), Ordering::Release);
        self.state.store(WorkerState::Booting as u8, Ordering::Release);
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// The process accepts connections; make it claimable.
    pub fn mark_ready(&self) {
        if self
            .state
            .compare_exchange(
                WorkerState::Booting as u8,
                WorkerState::Idle as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            self.idle.notify_waiters();
        }
    }

    /// The process is gone or being replaced.
    pub fn mark_dead(&self) {
        self.state.store(WorkerState::Dead as u8, Ordering::Release);
        self.pid.store(0, Ordering::Release);
    }

    /// The slot will not be respawned.
    pub fn mark_stopped(&self) {
        self.state.store(WorkerState::Stopped as u8, Ordering::Release);
        self.pid.store(0, Ordering::Release);
        // Queued requests must learn the pool is closing.
        self.idle.notify_waiters();
    }

    /// Take an idle worker out of rotation for good. Fails while it is busy.
    pub fn retire(&self) -> bool {
        let retired = self
            .state
            .compare_exchange(
                WorkerState::Idle as u8,
                WorkerState::Stopped as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if retired {
            self.idle.notify_waiters();
        }
        retired
    }

    pub fn record_restart(&self) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
    }

    /// Wait until the dispatcher asks for process `generation` to be replaced.
    ///
    /// Requests aimed at an earlier process (e.g. one that exited on its own
    /// while being condemned) are skipped.
    pub async fn restart_requested(&self, generation: u64) {
        loop {
            if self.condemned.load(Ordering::Acquire) == generation {
                return;
            }
            self.restart.notified().await;
        }
    }

    // --- Dispatcher side ---

    /// Ask the supervisor to kill and replace the current process. The slot
    /// is taken out of rotation immediately.
    pub fn request_restart(&self) {
        self.condemned.store(self.generation(), Ordering::Release);
        self.state.store(WorkerState::Dead as u8, Ordering::Release);
        self.restart.notify_one();
    }

    /// Claim an idle worker for exactly one request.
    pub fn try_claim(self: &Arc<Self>) -> Option<WorkerGuard> {
        self.state
            .compare_exchange(
                WorkerState::Idle as u8,
                WorkerState::Busy as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()
            .map(|_| WorkerGuard {
                worker: Arc::clone(self),
            })
    }

    fn release(&self) {
        // A restart request may have landed while busy; leave Dead alone.
        if self
            .state
            .compare_exchange(
                WorkerState::Busy as u8,
                WorkerState::Idle as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            self.idle.notify_waiters();
        }
    }

    pub fn snapshot(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            id: self.id,
            pid: self.pid(),
            port: self.port(),
            state: self.state(),
            generation: self.generation(),
            requests_served: self.requests_served(),
            restarts: self.restarts(),
        }
    }
}

/// Point-in-time view of a worker for the admin API.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WorkerSnapshot {
    pub id: usize,
    pub pid: Option<u32>,
    pub port: u16,
    pub state: WorkerState,
    pub generation: u64,
    pub requests_served: u64,
    pub restarts: u64,
}

/// Exclusive claim on a busy worker. Returns it to Idle on drop.
#[derive(Debug)]
pub struct WorkerGuard {
    worker: Arc<Worker>,
}

impl WorkerGuard {
    pub fn record_served(&self) {
        self.worker.requests_served.fetch_add(1, Ordering::Relaxed);
    }
}

impl Deref for WorkerGuard {
    type Target = Worker;
    fn deref(&self) -> &Self::Target {
        &self.worker
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.worker.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker() -> Arc<Worker> {
        Arc::new(Worker::new(0, Arc::new(Notify::new())))
    }

    #[test]
    fn booting_worker_cannot_be_claimed() {
        let w = worker();
        w.mark_booting(40001, Some(100));
        assert!(w.try_claim().is_none());

        w.mark_ready();
        assert_eq!(w.state(), WorkerState::Idle);
        assert_eq!(w.addr().to_string(), "127.0.0.1:40001");
    }

    #[test]
    fn one_request_at_a_time() {
        let w = worker();
        w.mark_booting(40002, Some(101));
        w.mark_ready();

        let guard = w.try_claim().unwrap();
        assert_eq!(w.state(), WorkerState::Busy);
        assert!(w.try_claim().is_none());

        drop(guard);
        assert_eq!(w.state(), WorkerState::Idle);
        assert!(w.try_claim().is_some());
    }

    #[test]
    fn restart_request_survives_guard_release() {
        let w = worker();
        w.mark_booting(40003, Some(102));
        w.mark_ready();

        let guard = w.try_claim().unwrap();
        w.request_restart();
        drop(guard);

        assert_eq!(w.state(), WorkerState::Dead);
        assert!(w.try_claim().is_none());
    }

    #[test]
    fn busy_worker_is_retired_only_after_release() {
        let w = worker();
        w.mark_booting(40007, Some(106));
        w.mark_ready();

        let guard = w.try_claim().unwrap();
        assert!(!w.retire());
        assert_eq!(w.state(), WorkerState::Busy);

        drop(guard);
        assert!(w.retire());
        assert_eq!(w.state(), WorkerState::Stopped);
        assert!(w.try_claim().is_none());
    }

    #[test]
    fn generation_counts_spawns() {
        let w = worker();
        assert_eq!(w.mark_booting(1, Some(1)), 1);
        w.mark_dead();
        assert_eq!(w.pid(), None);
        assert_eq!(w.mark_booting(2, Some(2)), 2);
        assert_eq!(w.snapshot().generation, 2);
    }

    #[tokio::test]
    async fn restart_signal_is_not_lost() {
        let w = worker();
        let generation = w.mark_booting(40004, Some(103));
        w.request_restart();
        tokio::time::timeout(
            std::time::Duration::from_millis(100),
            w.restart_requested(generation),
        )
        .await
        .expect("restart request should be seen");
    }

    #[tokio::test]
    async fn stale_restart_does_not_hit_next_process() {
        let w = worker();
        w.mark_booting(40005, Some(104));
        w.request_restart();

        let next = w.mark_booting(40006, Some(105));
        let waited = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            w.restart_requested(next),
        )
        .await;
        assert!(waited.is_err());
    }
}
