//! Command-line interface of the launcher.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{CliOverrides, ConfigError, Profile};

#[derive(Debug, Parser)]
#[command(name = "materialsuite-launcher")]
#[command(version, about = "Prefork HTTP launcher for the materialsuite endpoint", long_about = None)]
pub struct Cli {
    /// Application entry point handed to each worker (`module:attribute`)
    #[arg(long)]
    pub app: Option<String>,

    /// Number of worker processes
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Per-request timeout in seconds (0 = unbounded)
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Listen address as HOST:PORT
    #[arg(short, long, value_name = "HOST:PORT", conflicts_with = "port")]
    pub bind: Option<String>,

    /// Listen port on all interfaces
    #[arg(short, long)]
    pub port: Option<u16>,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Which parameters may be overridden (configurable, pinned, literal)
    #[arg(long)]
    pub profile: Option<Profile>,

    /// Worker command template, e.g. "waitress-serve --port={port} {app}"
    #[arg(long, value_name = "COMMAND")]
    pub worker_cmd: Option<String>,

    /// Log level used when RUST_LOG is unset
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// The flags the user actually passed, as configuration overrides.
    pub fn overrides(&self) -> Result<CliOverrides, ConfigError> {
        let (host, port) = match &self.bind {
            Some(bind) => {
                let (host, port) = split_bind(bind)?;
                (Some(host), Some(port))
            }
            None => (None, self.port),
        };

        Ok(CliOverrides {
            app: self.app.clone(),
            host,
            port,
            workers: self.workers,
            timeout: self.timeout,
            profile: self.profile,
            worker_command: self
                .worker_cmd
                .as_deref()
                .map(|cmd| cmd.split_whitespace().map(str::to_string).collect()),
            log_level: self.log_level.clone(),
        })
    }
}

/// Split `HOST:PORT`, accepting `[v6]:PORT`.
fn split_bind(bind: &str) -> Result<(String, u16), ConfigError> {
    let invalid = || ConfigError::InvalidBind(bind.to_string());

    let (host, port) = bind.rsplit_once(':').ok_or_else(invalid)?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(invalid());
    }
    let port = port.parse().map_err(|_| invalid())?;
    Ok((host.to_string(), port))
}
