//! Configuration management for homegate
//!
//! Precedence, lowest first: built-in defaults, the TOML file, then
//! [`Overrides`] collected from `HOMEGATE_*` environment variables and CLI
//! flags.

pub mod file;

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::retry::RetryPolicy;
use crate::{Error, Result};

use file::HomegateConfigFile;

/// Plain-HTTP TR-064 port
pub const DEFAULT_PORT: u16 = 49000;

/// TLS TR-064 port
pub const DEFAULT_TLS_PORT: u16 = 49443;

/// Upper bound on concurrent enrichment channels
pub const MAX_WORKERS: usize = 4;

/// Upper bound on retry attempts per read-only action
pub const MAX_RETRIES: u32 = 3;

/// Complete homegate configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// How to reach and authenticate to the gateway
    pub connection: ConnectionConfig,

    /// Per-call timeout and retry behaviour
    pub invoke: InvokeConfig,

    /// Host enrichment lookups
    pub enrichment: EnrichmentConfig,

    /// Optional heuristic probes
    pub probe: ProbeConfig,
}

/// Gateway connection settings
pub struct ConnectionConfig {
    /// Hostname or IP address
    pub address: String,

    /// TR-064 port
    pub port: u16,

    /// Use HTTPS
    pub tls: bool,

    /// Username (may be empty for devices that accept anonymous access)
    pub username: String,

    /// Password
    pub password: SecretString,

    /// HTTP request timeout
    pub timeout: Duration,
}

impl Clone for ConnectionConfig {
    fn clone(&self) -> Self {
        Self {
            address: self.address.clone(),
            port: self.port,
            tls: self.tls,
            username: self.username.clone(),
            password: SecretString::from(self.password.expose_secret().to_owned()),
            timeout: self.timeout,
        }
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("username", &self.username)
            .field("password", &"***")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ConnectionConfig {
    /// Base URL of the TR-064 endpoint
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the address doesn't form a valid URL
    pub fn base_url(&self) -> Result<Url> {
        let scheme = if self.tls { "https" } else { "http" };
        let host = if self.address.contains(':') && !self.address.starts_with('[') {
            // Bare IPv6 literal
            format!("[{}]", self.address)
        } else {
            self.address.clone()
        };

        Url::parse(&format!("{scheme}://{host}:{}/", self.port))
            .map_err(|e| Error::Config(format!("invalid gateway address {}: {e}", self.address)))
    }
}

/// Per-call behaviour
#[derive(Debug, Clone)]
pub struct InvokeConfig {
    /// Bound on a single invocation
    pub timeout: Duration,

    /// Retry attempts for read-only actions, 0..=[`MAX_RETRIES`] (0 disables retry)
    pub retries: u32,

    /// Base backoff delay, doubled per attempt
    pub backoff_base: Duration,

    /// Backoff cap
    pub backoff_max: Duration,
}

impl Default for InvokeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retries: 0,
            backoff_base: Duration::from_millis(250),
            backoff_max: Duration::from_secs(5),
        }
    }
}

impl InvokeConfig {
    /// Retry policy, or `None` when retry is disabled
    #[must_use]
    pub fn retry_policy(&self) -> Option<RetryPolicy> {
        (self.retries > 0).then(|| RetryPolicy {
            max_retries: self.retries,
            base_delay: self.backoff_base,
            max_delay: self.backoff_max,
        })
    }
}

/// Host enrichment settings
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    /// Concurrent lookup channels, 1..=[`MAX_WORKERS`]
    pub workers: usize,

    /// Look up IPv6 addresses per host
    pub ipv6: bool,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            workers: MAX_WORKERS,
            ipv6: true,
        }
    }
}

/// Heuristic probe settings
#[derive(Debug, Clone, Default)]
pub struct ProbeConfig {
    /// Probe LAN/WLAN services for traffic counters
    pub telemetry: bool,
}

/// Values supplied by environment variables or CLI flags
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub address: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<bool>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: Option<u64>,
    pub retries: Option<u32>,
    pub workers: Option<usize>,
    pub ipv6: Option<bool>,
    pub probe_telemetry: Option<bool>,
}

impl Config {
    /// Load configuration from the config file and overrides
    ///
    /// # Errors
    ///
    /// Returns error if the resulting configuration is invalid
    pub fn load(config_path: Option<&std::path::Path>, overrides: &Overrides) -> Result<Self> {
        let fc = file::load_config_file(config_path);
        Self::resolve(&fc, overrides)
    }

    /// Merge a parsed config file with overrides (overrides win)
    ///
    /// # Errors
    ///
    /// Returns error if the resulting configuration is invalid
    pub fn resolve(fc: &HomegateConfigFile, overrides: &Overrides) -> Result<Self> {
        let tls = overrides.tls.or(fc.gateway.tls).unwrap_or(false);
        let default_port = if tls { DEFAULT_TLS_PORT } else { DEFAULT_PORT };

        let mut invoke = InvokeConfig::default();
        if let Some(secs) = overrides.timeout_secs.or(fc.invoke.timeout_secs) {
            invoke.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = overrides.retries.or(fc.invoke.retries) {
            invoke.retries = retries.min(MAX_RETRIES);
        }
        if let Some(ms) = fc.invoke.backoff_ms {
            invoke.backoff_base = Duration::from_millis(ms);
        }

        let connection = ConnectionConfig {
            address: overrides
                .address
                .clone()
                .or_else(|| fc.gateway.address.clone())
                .unwrap_or_default(),
            port: overrides.port.or(fc.gateway.port).unwrap_or(default_port),
            tls,
            username: overrides
                .username
                .clone()
                .or_else(|| fc.gateway.username.clone())
                .unwrap_or_default(),
            password: SecretString::from(
                overrides
                    .password
                    .clone()
                    .or_else(|| fc.gateway.password.clone())
                    .unwrap_or_default(),
            ),
            timeout: invoke.timeout,
        };

        let defaults = EnrichmentConfig::default();
        let enrichment = EnrichmentConfig {
            workers: overrides
                .workers
                .or(fc.enrichment.workers)
                .unwrap_or(defaults.workers)
                .clamp(1, MAX_WORKERS),
            ipv6: overrides.ipv6.or(fc.enrichment.ipv6).unwrap_or(defaults.ipv6),
        };

        let probe = ProbeConfig {
            telemetry: overrides
                .probe_telemetry
                .or(fc.probe.telemetry)
                .unwrap_or(false),
        };

        let config = Self {
            connection,
            invoke,
            enrichment,
            probe,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the rest of the crate relies on
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty address or a zero timeout
    pub fn validate(&self) -> Result<()> {
        if self.connection.address.trim().is_empty() {
            return Err(Error::Config(
                "gateway address is required (--address or HOMEGATE_ADDRESS)".to_string(),
            ));
        }
        if self.invoke.timeout.is_zero() {
            return Err(Error::Config("timeout must be greater than zero".to_string()));
        }
        self.connection.base_url()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use file::{GatewayFileConfig, InvokeFileConfig};

    fn with_address(address: &str) -> Overrides {
        Overrides {
            address: Some(address.to_string()),
            ..Overrides::default()
        }
    }

    #[test]
    fn defaults_apply() {
        let config = Config::resolve(&HomegateConfigFile::default(), &with_address("fritz.box")).unwrap();

        assert_eq!(config.connection.port, DEFAULT_PORT);
        assert!(!config.connection.tls);
        assert_eq!(config.invoke.timeout, Duration::from_secs(10));
        assert!(config.invoke.retry_policy().is_none());
        assert_eq!(config.enrichment.workers, MAX_WORKERS);
        assert!(config.enrichment.ipv6);
        assert!(!config.probe.telemetry);
    }

    #[test]
    fn tls_switches_default_port() {
        let overrides = Overrides {
            tls: Some(true),
            ..with_address("fritz.box")
        };
        let config = Config::resolve(&HomegateConfigFile::default(), &overrides).unwrap();
        assert_eq!(config.connection.port, DEFAULT_TLS_PORT);
        assert_eq!(
            config.connection.base_url().unwrap().as_str(),
            "https://fritz.box:49443/"
        );
    }

    #[test]
    fn overrides_beat_file() {
        let fc = HomegateConfigFile {
            gateway: GatewayFileConfig {
                address: Some("10.0.0.1".to_string()),
                username: Some("file-user".to_string()),
                port: Some(8080),
                ..GatewayFileConfig::default()
            },
            invoke: InvokeFileConfig {
                timeout_secs: Some(3),
                retries: Some(2),
                backoff_ms: Some(100),
            },
            ..HomegateConfigFile::default()
        };
        let overrides = Overrides {
            username: Some("cli-user".to_string()),
            ..Overrides::default()
        };

        let config = Config::resolve(&fc, &overrides).unwrap();
        assert_eq!(config.connection.address, "10.0.0.1");
        assert_eq!(config.connection.username, "cli-user");
        assert_eq!(config.connection.port, 8080);
        assert_eq!(config.invoke.timeout, Duration::from_secs(3));

        let policy = config.invoke.retry_policy().unwrap();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.base_delay, Duration::from_millis(100));
    }

    #[test]
    fn workers_are_clamped() {
        let overrides = Overrides {
            workers: Some(16),
            ..with_address("fritz.box")
        };
        let config = Config::resolve(&HomegateConfigFile::default(), &overrides).unwrap();
        assert_eq!(config.enrichment.workers, MAX_WORKERS);

        let overrides = Overrides {
            workers: Some(0),
            ..with_address("fritz.box")
        };
        let config = Config::resolve(&HomegateConfigFile::default(), &overrides).unwrap();
        assert_eq!(config.enrichment.workers, 1);
    }

    #[test]
    fn retries_are_capped() {
        let overrides = Overrides {
            retries: Some(1_000),
            ..with_address("fritz.box")
        };
        let config = Config::resolve(&HomegateConfigFile::default(), &overrides).unwrap();
        assert_eq!(config.invoke.retries, MAX_RETRIES);
        assert_eq!(config.invoke.retry_policy().unwrap().max_retries, MAX_RETRIES);

        let fc = HomegateConfigFile {
            invoke: InvokeFileConfig {
                retries: Some(u32::MAX),
                ..InvokeFileConfig::default()
            },
            ..HomegateConfigFile::default()
        };
        let config = Config::resolve(&fc, &with_address("fritz.box")).unwrap();
        assert_eq!(config.invoke.retries, MAX_RETRIES);
    }

    #[test]
    fn missing_address_is_rejected() {
        let err = Config::resolve(&HomegateConfigFile::default(), &Overrides::default()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let overrides = Overrides {
            timeout_secs: Some(0),
            ..with_address("fritz.box")
        };
        assert!(Config::resolve(&HomegateConfigFile::default(), &overrides).is_err());
    }

    #[test]
    fn ipv6_literal_is_bracketed() {
        let config = Config::resolve(&HomegateConfigFile::default(), &with_address("fd00::1")).unwrap();
        assert_eq!(
            config.connection.base_url().unwrap().as_str(),
            "http://[fd00::1]:49000/"
        );
    }

    #[test]
    fn debug_masks_password() {
        let overrides = Overrides {
            password: Some("hunter2".to_string()),
            ..with_address("fritz.box")
        };
        let config = Config::resolve(&HomegateConfigFile::default(), &overrides).unwrap();
        let rendered = format!("{:?}", config.connection);
        assert!(!rendered.contains("hunter2"));
    }
}
