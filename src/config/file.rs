//! TOML configuration file loading
//!
//! Supports `~/.config/homegate/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct HomegateConfigFile {
    /// Gateway address and credentials
    #[serde(default)]
    pub gateway: GatewayFileConfig,

    /// Per-call behaviour
    #[serde(default)]
    pub invoke: InvokeFileConfig,

    /// Host enrichment lookups
    #[serde(default)]
    pub enrichment: EnrichmentFileConfig,

    /// Optional heuristic probes
    #[serde(default)]
    pub probe: ProbeFileConfig,
}

/// Gateway connection settings
#[derive(Debug, Default, Deserialize)]
pub struct GatewayFileConfig {
    /// Hostname or IP address (e.g. "192.168.178.1")
    pub address: Option<String>,
    /// TR-064 port (49000 plain, 49443 TLS)
    pub port: Option<u16>,
    /// Use HTTPS
    pub tls: Option<bool>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Invocation settings
#[derive(Debug, Default, Deserialize)]
pub struct InvokeFileConfig {
    /// Per-call timeout in seconds
    pub timeout_secs: Option<u64>,
    /// Retry attempts for read-only actions (0 disables retry)
    pub retries: Option<u32>,
    /// Base backoff delay in milliseconds
    pub backoff_ms: Option<u64>,
}

/// Host enrichment settings
#[derive(Debug, Default, Deserialize)]
pub struct EnrichmentFileConfig {
    /// Concurrent lookup channels (clamped to 1..=4)
    pub workers: Option<usize>,
    /// Look up IPv6 addresses per host
    pub ipv6: Option<bool>,
}

/// Heuristic probe settings
#[derive(Debug, Default, Deserialize)]
pub struct ProbeFileConfig {
    /// Probe LAN/WLAN services for traffic counters
    pub telemetry: Option<bool>,
}

/// Load the TOML config file from `path`, or the standard path when `None`
///
/// Returns `HomegateConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: Option<&Path>) -> HomegateConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return HomegateConfigFile::default();
    };

    if !path.exists() {
        return HomegateConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                HomegateConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            HomegateConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/homegate/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("homegate").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn reads_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[gateway]
address = "192.168.178.1"
username = "admin"

[enrichment]
workers = 2
"#
        )
        .unwrap();

        let config = load_config_file(Some(file.path()));
        assert_eq!(config.gateway.address.as_deref(), Some("192.168.178.1"));
        assert_eq!(config.gateway.username.as_deref(), Some("admin"));
        assert_eq!(config.gateway.port, None);
        assert_eq!(config.enrichment.workers, Some(2));
        assert_eq!(config.probe.telemetry, None);
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "gateway = [not toml").unwrap();

        let config = load_config_file(Some(file.path()));
        assert!(config.gateway.address.is_none());
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_file(Some(&dir.path().join("absent.toml")));
        assert!(config.gateway.address.is_none());
    }
}
