//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once at startup
//! - Honour `RUST_LOG`, falling back to the configured level
//! - Pretty output for terminals, JSON lines for log shippers

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};
use crate::error::LaunchError;

/// Filter used when neither `RUST_LOG` nor the config says otherwise.
pub fn default_directive(level: &str) -> String {
    format!("materialsuite_launcher={level},tower_http={level}")
}

/// Install the global subscriber.
pub fn init_logging(config: &ObservabilityConfig) -> Result<(), LaunchError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(&config.log_level)))
        .map_err(|e| LaunchError::Logging(e.to_string()))?;

    let (pretty, json) = match config.log_format {
        LogFormat::Pretty => (Some(fmt::layer().with_writer(std::io::stderr)), None),
        LogFormat::Json => (
            None,
            Some(fmt::layer().json().with_writer(std::io::stderr)),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .try_init()
        .map_err(|e| LaunchError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_scopes_crate_and_http_layer() {
        let directive = default_directive("debug");
        assert_eq!(directive, "materialsuite_launcher=debug,tower_http=debug");
        assert!(EnvFilter::try_new(directive).is_ok());
    }
}
