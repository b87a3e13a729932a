//! materialsuite-launcher
//!
//! ```text
//!                        ┌──────────────────────── arbiter ────────────────────────┐
//!   Client Request       │  ┌──────────┐   ┌────────────┐   ┌──────────────────┐   │
//!   ─────────────────────┼─▶│ listener │──▶│ http       │──▶│ worker pool      │───┼──▶ worker 0 (127.0.0.1:p0)
//!                        │  │ :8910    │   │ dispatch   │   │ one request each │───┼──▶ worker 1 (127.0.0.1:p1)
//!   Client Response      │  └──────────┘   └────────────┘   └──────────────────┘───┼──▶ ...
//!   ◀────────────────────┼───────────────────────┘                   ▲             │
//!                        │                                            │             │
//!                        │   slot supervisors: spawn, probe, respawn, kill on timeout
//!                        └─────────────────────────────────────────────────────────┘
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use materialsuite_launcher::cli::Cli;
use materialsuite_launcher::config::EnvOverrides;
use materialsuite_launcher::error::EXIT_OK;
use materialsuite_launcher::lifecycle::startup;
use materialsuite_launcher::observability::logging::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let resolution = match startup::prepare(&cli, &EnvOverrides::from_env()) {
        Ok(resolution) => resolution,
        Err(e) => {
            eprintln!("materialsuite-launcher: {e}");
            return ExitCode::from(e.exit_code());
        }
    };

    if let Err(e) = init_logging(&resolution.config.observability) {
        eprintln!("materialsuite-launcher: {e}");
        return ExitCode::from(e.exit_code());
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "materialsuite-launcher starting");

    let config = resolution.config;
    for ignored in &resolution.ignored {
        tracing::warn!(
            profile = %config.profile,
            parameter = ignored.parameter,
            requested = %ignored.requested,
            pinned = %ignored.pinned,
            "Override ignored, parameter is fixed by the profile"
        );
    }

    tracing::info!(
        profile = %config.profile,
        bind_address = %config.bind_address(),
        workers = config.workers.count,
        request_timeout = ?config.request_timeout(),
        "Configuration loaded"
    );

    match startup::launch(Arc::new(config)).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::from(EXIT_OK)
        }
        Err(e) => {
            tracing::error!(error = %e, "Launcher stopped with an error");
            eprintln!("materialsuite-launcher: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
