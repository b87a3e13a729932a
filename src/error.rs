//! Launcher error taxonomy and exit codes.

use thiserror::Error;

use crate::config::ConfigError;
use crate::net::listener::ListenerError;
use crate::workers::WorkerError;

/// Exit code for a clean shutdown.
pub const EXIT_OK: u8 = 0;
/// Exit code for bind, I/O and runtime failures.
pub const EXIT_FAILURE: u8 = 1;
/// Exit code for malformed or out-of-range configuration.
pub const EXIT_CONFIG: u8 = 2;
/// Exit code when the application entry point cannot be loaded.
pub const EXIT_APP_LOAD: u8 = 3;

/// Any error that stops the launcher.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("application failed to load: {0}")]
    AppLoad(#[source] WorkerError),

    #[error("metrics exporter failed: {0}")]
    Metrics(String),

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LaunchError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            LaunchError::Config(_) => EXIT_CONFIG,
            LaunchError::AppLoad(_) => EXIT_APP_LOAD,
            _ => EXIT_FAILURE,
        }
    }
}
