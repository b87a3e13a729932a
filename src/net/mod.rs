//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Startup
//!     → listener.rs (bind host:port, fail fast if occupied)
//!     → Hand off to HTTP layer (http/server.rs)
//! ```
//!
//! # Design Decisions
//! - Bind happens before any worker is spawned, so a port conflict costs nothing
//! - Workers never see the public socket; they listen on loopback ports

pub mod listener;

pub use listener::{Listener, ListenerError};
