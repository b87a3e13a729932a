//! Prefork HTTP launcher for the materialsuite endpoint.
//!
//! An arbiter process binds the public listener, keeps a fixed number of
//! worker processes alive and hands each request to exactly one idle worker,
//! killing and replacing any worker that exceeds the request timeout.

// Core subsystems
pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod net;
pub mod workers;

// Worker management
pub mod health;
pub mod lifecycle;

// Cross-cutting concerns
pub mod admin;
pub mod observability;
pub mod resilience;

pub use config::LaunchConfig;
pub use error::LaunchError;
pub use lifecycle::{PreforkManager, ProcessManager, ServerHandle, Shutdown};
