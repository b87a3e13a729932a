//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     CLI + env + file → resolve → ProcessManager::start
//!
//! Process manager (manager.rs):
//!     bind listener → spawn slot supervisors → all booted → serve
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → ProcessManager::stop
//!
//! Shutdown (shutdown.rs):
//!     broadcast → stop accepting → drain in-flight → kill and reap workers
//! ```
//!
//! # Design Decisions
//! - State machine: not started → listening → terminated
//! - Ordered shutdown: stop accept, drain, reap
//! - Draining is bounded by the graceful timeout

pub mod manager;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use manager::{PreforkManager, ProcessManager, ServerHandle};
pub use shutdown::Shutdown;
