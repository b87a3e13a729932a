//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (port > 0, at least one worker)
//! - Check every address the launcher will bind parses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: LaunchConfig → Result<(), Vec<ValidationError>>
//! - Runs after every override has been applied

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{host_port, LaunchConfig};

/// Hard ceiling on worker processes.
pub const MAX_WORKERS: usize = 1024;

/// A single semantic problem with a resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("port must be between 1 and 65535")]
    ZeroPort,
    #[error("worker count must be between 1 and 1024, got {0}")]
    WorkerCount(usize),
    #[error("application entry point is empty")]
    EmptyApp,
    #[error("worker command is empty")]
    EmptyCommand,
    #[error("listener host {0:?} is not a valid bind address")]
    ListenerHost(String),
    #[error("worker boot timeout must be at least one second")]
    BootTimeout,
    #[error("restart backoff base ({base}ms) exceeds its maximum ({max}ms)")]
    Backoff { base: u64, max: u64 },
    #[error("admin bind address {0:?} is invalid")]
    AdminAddress(String),
    #[error("admin API is enabled without an api_key")]
    AdminKey,
    #[error("metrics address {0:?} is invalid")]
    MetricsAddress(String),
}

/// Check a fully resolved configuration.
pub fn validate_config(config: &LaunchConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.port == 0 {
        errors.push(ValidationError::ZeroPort);
    }
    if config.workers.count == 0 || config.workers.count > MAX_WORKERS {
        errors.push(ValidationError::WorkerCount(config.workers.count));
    }
    if config.app.trim().is_empty() {
        errors.push(ValidationError::EmptyApp);
    }
    // Blank arguments are dropped when the command is rendered, so the
    // program is the first argument that is not blank.
    if !config.workers.command.iter().any(|arg| !arg.trim().is_empty()) {
        errors.push(ValidationError::EmptyCommand);
    }
    // Port is checked on its own above; probe the host with a placeholder.
    if host_port(&config.listener.host, 1).parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::ListenerHost(config.listener.host.clone()));
    }
    if config.workers.boot_timeout_secs == 0 {
        errors.push(ValidationError::BootTimeout);
    }
    if config.workers.restart_backoff_base_ms > config.workers.restart_backoff_max_ms {
        errors.push(ValidationError::Backoff {
            base: config.workers.restart_backoff_base_ms,
            max: config.workers.restart_backoff_max_ms,
        });
    }
    if config.admin.enabled {
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::AdminAddress(config.admin.bind_address.clone()));
        }
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::AdminKey);
        }
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_socket_addr().is_none()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
