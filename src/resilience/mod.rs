//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to worker:
//!     → timeouts.rs (enforce the per-request deadline)
//!     → On expiry: worker restart requested, client gets 504
//!
//! Worker process exit:
//!     → backoff.rs (jittered delay before respawn)
//! ```
//!
//! # Design Decisions
//! - No request is retried here; clients or an outer proxy own retries
//! - Respawns of healthy-then-killed workers are immediate
//! - Crash loops back off exponentially

pub mod backoff;
pub mod timeouts;

pub use backoff::respawn_delay;
pub use timeouts::{deadline_after, with_deadline, DeadlineExceeded};
