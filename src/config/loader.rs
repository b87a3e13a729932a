//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::LaunchConfig;
use crate::config::ConfigError;

/// Parse a TOML configuration file.
///
/// Validation is deferred until environment and CLI overrides are applied,
/// since a file may legitimately leave the port to `PORT`.
pub fn load_config(path: &Path) -> Result<LaunchConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: LaunchConfig = toml::from_str(&content)?;

    tracing::debug!(path = %path.display(), "Configuration file parsed");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_worker_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            app = "materialsuite_endpoint:app"

            [workers]
            count = 2
            command = ["waitress-serve", "--port={{port}}", "{{app}}"]
            app_config = "/etc/materialsuite/endpoint.cfg"

            [workers.env]
            TMPDIR = "/var/tmp"
            "#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.workers.count, 2);
        assert_eq!(config.workers.command[1], "--port={port}");
        assert_eq!(config.workers.env.get("TMPDIR").map(String::as_str), Some("/var/tmp"));
        assert_eq!(
            config.workers.app_config.as_deref(),
            Some("/etc/materialsuite/endpoint.cfg")
        );
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_config(Path::new("/nonexistent/launcher.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/launcher.toml"));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[listener\nport = ").unwrap();
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
