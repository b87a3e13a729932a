//! Worker pool.
//!
//! # Responsibilities
//! - Own the fixed set of worker slots
//! - Hand an idle worker to each request, rotating the starting slot
//! - Queue requests (bounded wait) while every worker is busy or booting

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::resilience::deadline_after;
use crate::workers::worker::{Worker, WorkerGuard, WorkerSnapshot, WorkerState};

/// Fixed-size set of worker slots.
#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<Arc<Worker>>,
    idle: Arc<Notify>,
    cursor: AtomicUsize,
}

impl WorkerPool {
    pub fn new(count: usize) -> Self {
        let idle = Arc::new(Notify::new());
        let workers = (0..count)
            .map(|id| Arc::new(Worker::new(id, Arc::clone(&idle))))
            .collect();

        Self {
            workers,
            idle,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn workers(&self) -> &[Arc<Worker>] {
        &self.workers
    }

    /// Workers currently able to take (or serving) a request.
    pub fn ready_count(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| matches!(w.state(), WorkerState::Idle | WorkerState::Busy))
            .count()
    }

    /// Live worker PIDs.
    pub fn pids(&self) -> Vec<u32> {
        self.workers.iter().filter_map(|w| w.pid()).collect()
    }

    pub fn snapshot(&self) -> Vec<WorkerSnapshot> {
        self.workers.iter().map(|w| w.snapshot()).collect()
    }

    /// Claim any idle worker without waiting.
    pub fn try_acquire(&self) -> Option<WorkerGuard> {
        let len = self.workers.len();
        if len == 0 {
            return None;
        }

        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        (0..len)
            .map(|offset| &self.workers[(start + offset) % len])
            .find_map(|w| w.try_claim())
    }

    /// Every slot has been shut down; nothing will become idle again.
    pub fn is_closed(&self) -> bool {
        self.workers
            .iter()
            .all(|w| w.state() == WorkerState::Stopped)
    }

    /// Claim an idle worker, waiting at most `wait` for one to free up.
    /// Gives up at once when the pool is closed.
    pub async fn acquire(&self, wait: Duration) -> Option<WorkerGuard> {
        let deadline = deadline_after(wait);

        loop {
            // Register interest before checking so a release in between is seen.
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(guard) = self.try_acquire() {
                return Some(guard);
            }
            if self.is_closed() {
                tracing::debug!("Worker pool closed, not queueing");
                return None;
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                tracing::debug!(
                    workers = self.workers.len(),
                    ready = self.ready_count(),
                    "No worker became idle before the queue deadline"
                );
                return None;
            }
        }
    }
}
