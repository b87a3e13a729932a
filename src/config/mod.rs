//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → resolve.rs (env snapshot + CLI overrides, profile pins)
//!     → validation.rs (semantic checks)
//!     → LaunchConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once resolved; there is no reload path
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod resolve;
pub mod schema;
pub mod validation;

use std::path::PathBuf;

use thiserror::Error;

pub use resolve::{resolve, CliOverrides, EnvOverrides, IgnoredOverride, Resolution};
pub use schema::{
    AdminConfig, LaunchConfig, ListenerConfig, LogFormat, ObservabilityConfig, Profile,
    TimeoutConfig, WorkerConfig,
};
pub use validation::ValidationError;

/// Error type for configuration loading and resolution.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{name} must be a non-negative integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("unknown profile {0:?} (expected configurable, pinned or literal)")]
    InvalidProfile(String),

    #[error("invalid bind address {0:?} (expected HOST:PORT)")]
    InvalidBind(String),

    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
