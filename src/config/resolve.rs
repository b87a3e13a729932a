//! Layering of environment and command-line overrides onto a base config.
//!
//! Precedence for every overridable parameter is CLI, then environment,
//! then config file, then built-in default. The active [`Profile`] then pins
//! whatever it fixes; an override that loses to a pin is reported back as an
//! [`IgnoredOverride`] so the caller can log it once logging is up.

use std::collections::HashMap;
use std::ffi::OsString;

use crate::config::schema::{LaunchConfig, Profile};
use crate::config::validation::validate_config;
use crate::config::ConfigError;

/// Environment variable carrying the application config path.
pub const APP_CONFIG_ENV: &str = "MATERIALSUITE_ENDPOINT_CONFIG";

/// Variables read by [`EnvOverrides::from_env`].
const ENV_KEYS: [&str; 5] = ["PORT", "WORKERS", "TIMEOUT", "LAUNCH_PROFILE", APP_CONFIG_ENV];

/// Snapshot of the environment variables the launcher understands.
///
/// Taken once at startup; nothing reads the process environment afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub port: Option<String>,
    pub workers: Option<String>,
    pub timeout: Option<String>,
    pub profile: Option<String>,
    pub app_config: Option<String>,
}

impl EnvOverrides {
    /// Read the overrides from the process environment. Other variables are
    /// never looked at, whatever their encoding.
    pub fn from_env() -> Self {
        Self::from_os_pairs(
            ENV_KEYS
                .iter()
                .filter_map(|&key| std::env::var_os(key).map(|value| (key, value))),
        )
    }

    /// Like [`from_pairs`](Self::from_pairs) for raw OS values. Invalid
    /// Unicode is replaced, so a mangled number fails to parse later.
    pub fn from_os_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, OsString)>,
    {
        Self::from_pairs(
            pairs
                .into_iter()
                .map(|(key, value)| (key, value.to_string_lossy().into_owned())),
        )
    }

    /// Build from arbitrary key/value pairs. Empty values count as unset,
    /// matching a build argument declared without a value.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(_, v)| !v.trim().is_empty())
            .collect();

        Self {
            port: vars.get("PORT").cloned(),
            workers: vars.get("WORKERS").cloned(),
            timeout: vars.get("TIMEOUT").cloned(),
            profile: vars.get("LAUNCH_PROFILE").cloned(),
            app_config: vars.get(APP_CONFIG_ENV).cloned(),
        }
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    pub app: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub workers: Option<usize>,
    pub timeout: Option<u64>,
    pub profile: Option<Profile>,
    pub worker_command: Option<Vec<String>>,
    pub log_level: Option<String>,
}

/// An override that the active profile refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredOverride {
    pub parameter: &'static str,
    pub requested: String,
    pub pinned: String,
}

/// Outcome of [`resolve`]: the immutable config plus any refused overrides.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub config: LaunchConfig,
    pub ignored: Vec<IgnoredOverride>,
}

/// Which pinnable parameters some layer actually set.
#[derive(Debug, Default, Clone, Copy)]
struct Supplied {
    port: bool,
    workers: bool,
    timeout: bool,
}

impl Supplied {
    /// A file only counts as setting what it moves off the default.
    fn by_file(file: &LaunchConfig) -> Self {
        let defaults = LaunchConfig::default();
        Self {
            port: file.listener.port != defaults.listener.port,
            workers: file.workers.count != defaults.workers.count,
            timeout: file.timeouts.request_secs != defaults.timeouts.request_secs,
        }
    }
}

/// Merge a base configuration with environment and CLI overrides, apply the
/// profile's pins and validate the result.
pub fn resolve(
    base: Option<LaunchConfig>,
    env: &EnvOverrides,
    cli: &CliOverrides,
) -> Result<Resolution, ConfigError> {
    let mut supplied = base.as_ref().map(Supplied::by_file).unwrap_or_default();
    let mut config = base.unwrap_or_default();

    if let Some(profile) = &env.profile {
        config.profile = profile.parse()?;
    }
    if let Some(profile) = cli.profile {
        config.profile = profile;
    }

    if let Some(port) = &env.port {
        config.listener.port = parse_number("PORT", port)?;
        supplied.port = true;
    }
    if let Some(workers) = &env.workers {
        config.workers.count = parse_number("WORKERS", workers)?;
        supplied.workers = true;
    }
    if let Some(timeout) = &env.timeout {
        config.timeouts.request_secs = parse_number("TIMEOUT", timeout)?;
        supplied.timeout = true;
    }
    if let Some(path) = &env.app_config {
        config.workers.app_config = Some(path.clone());
    }

    if let Some(app) = &cli.app {
        config.app = app.clone();
    }
    if let Some(host) = &cli.host {
        config.listener.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.listener.port = port;
        supplied.port = true;
    }
    if let Some(workers) = cli.workers {
        config.workers.count = workers;
        supplied.workers = true;
    }
    if let Some(timeout) = cli.timeout {
        config.timeouts.request_secs = timeout;
        supplied.timeout = true;
    }
    if let Some(command) = &cli.worker_command {
        config.workers.command = command.clone();
    }
    if let Some(level) = &cli.log_level {
        config.observability.log_level = level.clone();
    }

    let ignored = apply_pins(&mut config, supplied);

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(Resolution { config, ignored })
}

/// Force the profile's fixed values. Only values someone asked for are
/// reported as ignored.
fn apply_pins(config: &mut LaunchConfig, supplied: Supplied) -> Vec<IgnoredOverride> {
    let profile = config.profile;
    let mut ignored = Vec::new();

    if let Some(port) = profile.pinned_port() {
        if supplied.port && config.listener.port != port {
            ignored.push(IgnoredOverride {
                parameter: "PORT",
                requested: config.listener.port.to_string(),
                pinned: port.to_string(),
            });
        }
        config.listener.port = port;
    }
    if let Some(workers) = profile.pinned_workers() {
        if supplied.workers && config.workers.count != workers {
            ignored.push(IgnoredOverride {
                parameter: "WORKERS",
                requested: config.workers.count.to_string(),
                pinned: workers.to_string(),
            });
        }
        config.workers.count = workers;
    }
    if let Some(timeout) = profile.pinned_timeout_secs() {
        if supplied.timeout && config.timeouts.request_secs != timeout {
            ignored.push(IgnoredOverride {
                parameter: "TIMEOUT",
                requested: config.timeouts.request_secs.to_string(),
                pinned: timeout.to_string(),
            });
        }
        config.timeouts.request_secs = timeout;
    }

    ignored
}

fn parse_number<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        name,
        value: raw.to_string(),
    })
}
