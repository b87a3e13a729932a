//! Worker process subsystem.
//!
//! # Data Flow
//! ```text
//! Manager start
//!     → pool.rs (N slots, all Booting)
//!     → supervisor.rs (one task per slot)
//!         → process.rs (allocate loopback port, render command, spawn)
//!         → health::readiness (wait for the port to accept)
//!         → worker.rs (slot becomes Idle)
//!
//! Dispatcher
//!     → pool.acquire() claims an Idle slot (Busy)
//!     → guard dropped: Busy → Idle
//!     → timeout: request_restart() → supervisor kills and respawns
//! ```
//!
//! # Design Decisions
//! - A slot serves exactly one request at a time (claim is a CAS on its state)
//! - Slots are stable; processes inside them come and go
//! - Every child is reaped by its supervisor, never left to the OS

pub mod pool;
pub mod process;
pub mod supervisor;
pub mod worker;

use std::io;

use thiserror::Error;

pub use pool::WorkerPool;
pub use supervisor::{SlotSupervisor, SupervisorEvent};
pub use worker::{Worker, WorkerGuard, WorkerSnapshot, WorkerState};

/// Failures while bringing a worker process up.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to allocate a loopback port: {0}")]
    PortAllocation(#[source] io::Error),

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("worker command is empty")]
    EmptyCommand,

    #[error("failed to wait on worker process: {0}")]
    Wait(#[source] io::Error),

    #[error("worker {worker_id} exited during boot ({status})")]
    ExitedDuringBoot { worker_id: usize, status: String },

    #[error("worker {worker_id} did not accept connections within {timeout_secs}s")]
    BootTimeout { worker_id: usize, timeout_secs: u64 },
}
