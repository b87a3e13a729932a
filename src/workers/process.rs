//! Worker process spawning.
//!
//! A worker is whatever the configured command starts, as long as it serves
//! HTTP on the loopback port it is handed. The command is an argv template;
//! placeholders are substituted per spawn and the same values are exported
//! as environment variables for commands that prefer those.

use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::config::resolve::APP_CONFIG_ENV;
use crate::config::schema::{LaunchConfig, WORKER_HOST};
use crate::workers::WorkerError;

/// Values substituted into the worker command template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholders<'a> {
    pub app: &'a str,
    pub host: &'a str,
    pub port: u16,
    pub worker_id: usize,
}

/// Substitute `{app}`, `{host}`, `{port}` and `{worker_id}` in every argument.
pub fn render_command(template: &[String], values: &Placeholders<'_>) -> Vec<String> {
    let port = values.port.to_string();
    let worker_id = values.worker_id.to_string();

    template
        .iter()
        .filter(|arg| !arg.trim().is_empty())
        .map(|arg| {
            arg.replace("{app}", values.app)
                .replace("{host}", values.host)
                .replace("{port}", &port)
                .replace("{worker_id}", &worker_id)
        })
        .collect()
}

/// Reserve a free loopback port for a worker.
///
/// The probe socket is released before the worker binds, so another process
/// could grab the port in between; the readiness probe then times out and the
/// slot is respawned on a fresh port.
pub fn allocate_port() -> Result<u16, WorkerError> {
    let probe = std::net::TcpListener::bind((WORKER_HOST, 0)).map_err(WorkerError::PortAllocation)?;
    let port = probe
        .local_addr()
        .map_err(WorkerError::PortAllocation)?
        .port();
    Ok(port)
}

/// Start one worker process listening on `port`.
pub fn spawn_worker(config: &LaunchConfig, worker_id: usize, port: u16) -> Result<Child, WorkerError> {
    let argv = render_command(
        &config.workers.command,
        &Placeholders {
            app: &config.app,
            host: WORKER_HOST,
            port,
            worker_id,
        },
    );
    let (program, args) = argv.split_first().ok_or(WorkerError::EmptyCommand)?;

    let mut command = Command::new(program);
    command
        .args(args)
        .envs(&config.workers.env)
        .env("PORT", port.to_string())
        .env("HOST", WORKER_HOST)
        .env("APP_MODULE", &config.app)
        .env("WORKER_ID", worker_id.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    // Own process group, so a stop takes down whatever the worker forks.
    #[cfg(unix)]
    command.process_group(0);

    if let Some(path) = &config.workers.app_config {
        command.env(APP_CONFIG_ENV, path);
    }

    let child = command.spawn().map_err(|source| WorkerError::Spawn {
        program: program.clone(),
        source,
    })?;

    tracing::debug!(
        worker_id,
        pid = ?child.id(),
        port,
        program = %program,
        "Worker process spawned"
    );

    Ok(child)
}
