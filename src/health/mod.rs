//! Worker health subsystem.
//!
//! # Data Flow
//! ```text
//! Worker spawned
//!     → readiness.rs (poll loopback port, watch for early exit)
//!     → Ready: slot becomes Idle
//!     → Not ready: boot failure reported to the slot supervisor
//!
//! After boot, liveness is observed directly:
//!     process exit        → supervisor respawns
//!     request past timeout → dispatcher requests restart
//! ```

pub mod readiness;

pub use readiness::wait_until_ready;
