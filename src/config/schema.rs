//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the launcher.
//! All types derive Serde traits so a TOML file can supply any subset of them;
//! environment and CLI overrides are layered on top in `resolve.rs`.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Entry point served by the workers unless overridden.
pub const DEFAULT_APP: &str = "materialsuite_endpoint:app";

/// Default public port.
pub const DEFAULT_PORT: u16 = 8910;

/// Default worker count for the configurable profile.
pub const DEFAULT_WORKERS: usize = 4;

/// Default per-request timeout (seconds) for the configurable profile.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Address workers listen on. Never exposed outside the host.
pub const WORKER_HOST: &str = "127.0.0.1";

/// Deployment profile deciding which parameters accept overrides.
///
/// The three historical deployment recipes disagree on what is tunable, so
/// the policy is chosen explicitly instead of merging them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Port, workers and timeout all come from env/CLI/file (defaults 8910/4/30).
    #[default]
    Configurable,
    /// Port is configurable; 9 workers and a 300s timeout are fixed.
    Pinned,
    /// Port 8910, 4 workers and no timeout, all fixed.
    Literal,
}

impl Profile {
    /// Fixed worker count, if this profile pins it.
    pub fn pinned_workers(self) -> Option<usize> {
        match self {
            Profile::Configurable => None,
            Profile::Pinned => Some(9),
            Profile::Literal => Some(DEFAULT_WORKERS),
        }
    }

    /// Fixed timeout in seconds (0 = unbounded), if this profile pins it.
    pub fn pinned_timeout_secs(self) -> Option<u64> {
        match self {
            Profile::Configurable => None,
            Profile::Pinned => Some(300),
            Profile::Literal => Some(0),
        }
    }

    /// Fixed port, if this profile pins it.
    pub fn pinned_port(self) -> Option<u16> {
        match self {
            Profile::Literal => Some(DEFAULT_PORT),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Profile::Configurable => "configurable",
            Profile::Pinned => "pinned",
            Profile::Literal => "literal",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "configurable" | "a" => Ok(Profile::Configurable),
            "pinned" | "b" => Ok(Profile::Pinned),
            "literal" | "c" => Ok(Profile::Literal),
            other => Err(ConfigError::InvalidProfile(other.to_string())),
        }
    }
}

/// Root configuration for the launcher.
///
/// Built once at startup and shared read-only (`Arc<LaunchConfig>`) with
/// every subsystem.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LaunchConfig {
    /// Which parameters accept overrides.
    pub profile: Profile,

    /// Application entry point handed to each worker (`module:attribute`).
    pub app: String,

    /// Public listener settings.
    pub listener: ListenerConfig,

    /// Worker process settings.
    pub workers: WorkerConfig,

    /// Request timeout settings.
    pub timeouts: TimeoutConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,

    /// Management API.
    pub admin: AdminConfig,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            profile: Profile::default(),
            app: DEFAULT_APP.to_string(),
            listener: ListenerConfig::default(),
            workers: WorkerConfig::default(),
            timeouts: TimeoutConfig::default(),
            observability: ObservabilityConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}

impl LaunchConfig {
    /// The public bind address as `host:port`.
    pub fn bind_address(&self) -> String {
        host_port(&self.listener.host, self.listener.port)
    }

    /// Per-request deadline, `None` when unbounded.
    pub fn request_timeout(&self) -> Option<Duration> {
        match self.timeouts.request_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Join a host and port, bracketing bare IPv6 hosts.
pub fn host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Public listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind (all interfaces by default).
    pub host: String,

    /// Public port.
    pub port: u16,

    /// How long a request may wait for an idle worker before a 503.
    pub queue_timeout_secs: u64,

    /// Largest request body forwarded to a worker, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            queue_timeout_secs: 60,
            max_body_bytes: 512 * 1024 * 1024,
        }
    }
}

impl ListenerConfig {
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_timeout_secs)
    }
}

/// Worker process configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of worker processes.
    pub count: usize,

    /// Argv template; `{app}`, `{host}`, `{port}` and `{worker_id}` are substituted.
    pub command: Vec<String>,

    /// Extra environment for every worker.
    pub env: std::collections::BTreeMap<String, String>,

    /// Application config file, exported as `MATERIALSUITE_ENDPOINT_CONFIG`.
    pub app_config: Option<String>,

    /// Time a new worker has to start accepting connections.
    pub boot_timeout_secs: u64,

    /// Time a busy worker gets to finish during shutdown.
    pub graceful_timeout_secs: u64,

    /// Consecutive boot failures of one slot tolerated after startup.
    pub max_boot_failures: u32,

    /// Base delay between respawns of a crashing worker.
    pub restart_backoff_base_ms: u64,

    /// Upper bound on the respawn delay.
    pub restart_backoff_max_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: DEFAULT_WORKERS,
            command: default_worker_command(),
            env: Default::default(),
            app_config: None,
            boot_timeout_secs: 30,
            graceful_timeout_secs: 30,
            max_boot_failures: 5,
            restart_backoff_base_ms: 100,
            restart_backoff_max_ms: 5_000,
        }
    }
}

impl WorkerConfig {
    pub fn boot_timeout(&self) -> Duration {
        Duration::from_secs(self.boot_timeout_secs)
    }

    pub fn graceful_timeout(&self) -> Duration {
        Duration::from_secs(self.graceful_timeout_secs)
    }
}

/// Single-threaded WSGI host bound to the worker's private port.
pub fn default_worker_command() -> Vec<String> {
    [
        "waitress-serve",
        "--host={host}",
        "--port={port}",
        "--threads=1",
        "{app}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Seconds a worker has to answer one request; 0 disables the limit.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Human-readable or JSON lines.
    pub log_format: LogFormat,

    /// Expose a Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn metrics_socket_addr(&self) -> Option<SocketAddr> {
        self.metrics_address.parse().ok()
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// Bearer token required on every admin request.
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:8911".to_string(),
        }
    }
}
