//! Startup orchestration.
//!
//! # Responsibilities
//! - Turn CLI flags, the environment snapshot and the optional config file
//!   into one immutable `LaunchConfig`
//! - Start the process group through a `ProcessManager`
//! - Hold it until a termination signal or a fatal supervisor event, then stop it
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal, there is no startup retry
//! - Signal handlers are installed before the listener is bound

use std::future::Future;
use std::sync::Arc;

use crate::cli::Cli;
use crate::config::{loader::load_config, resolve, EnvOverrides, LaunchConfig, Resolution};
use crate::error::LaunchError;
use crate::lifecycle::manager::{PreforkManager, ProcessManager};
use crate::lifecycle::signals::{Signals, Termination};
use crate::observability::metrics;

/// Resolve the configuration for this run. Nothing is started yet.
pub fn prepare(cli: &Cli, env: &EnvOverrides) -> Result<Resolution, LaunchError> {
    let base = cli.config.as_deref().map(load_config).transpose()?;
    let overrides = cli.overrides()?;
    Ok(resolve(base, env, &overrides)?)
}

/// Run the launcher with the prefork manager until SIGTERM/SIGINT.
pub async fn launch(config: Arc<LaunchConfig>) -> Result<(), LaunchError> {
    let mut signals = Signals::register()?;
    run(&PreforkManager::new(), config, async move { signals.recv().await }).await
}

/// Start `manager`, wait for `stop` or a fatal event, then stop it.
pub async fn run<M, F>(manager: &M, config: Arc<LaunchConfig>, stop: F) -> Result<(), LaunchError>
where
    M: ProcessManager + ?Sized,
    F: Future<Output = Termination>,
{
    if config.observability.metrics_enabled {
        if let Some(addr) = config.observability.metrics_socket_addr() {
            metrics::init_metrics(addr)?;
        }
    }

    let mut handle = manager.start(config).await?;
    tokio::pin!(stop);

    let outcome = tokio::select! {
        result = handle.wait() => result,
        signal = &mut stop => {
            tracing::info!(signal = signal.as_str(), "Received termination signal");
            Ok(())
        }
    };

    let stopped = manager.stop(handle).await;
    outcome.and(stopped)
}
