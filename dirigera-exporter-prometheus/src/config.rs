//! Configuration for the exporter.

use std::path::Path;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

use dirigera_common::{LoggingConfig, load_config, parse_config};
use dirigera_hub::{DEFAULT_PORT, HubSettings};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] dirigera_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExporterConfig {
    /// Hub connection settings.
    #[serde(default)]
    pub hub: HubConfig,

    /// HTTP endpoint settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// How the registry is kept in sync with the hub.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Hub connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Hostname or IP address of the hub.
    #[serde(default)]
    pub address: String,

    /// Access token obtained when pairing with the hub.
    #[serde(default = "empty_token")]
    pub token: SecretString,

    /// Hub API port (default: 8443).
    #[serde(default = "default_hub_port")]
    pub port: u16,

    /// Request and handshake timeout in seconds (default: 10).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Accept the self-signed certificate of the hub (default: true).
    #[serde(default = "default_true")]
    pub accept_invalid_certs: bool,
}

fn empty_token() -> SecretString {
    SecretString::from(String::new())
}

fn default_hub_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            token: empty_token(),
            port: default_hub_port(),
            timeout_secs: default_timeout(),
            accept_invalid_certs: true,
        }
    }
}

impl HubConfig {
    /// Connection settings for the hub client.
    pub fn settings(&self) -> HubSettings {
        HubSettings {
            address: self.address.clone(),
            port: self.port,
            token: self.token.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            accept_invalid_certs: self.accept_invalid_certs,
        }
    }
}

/// HTTP endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Expected Host header; other hosts get a 404.
    #[serde(default)]
    pub hostname: String,

    /// Prefix under which every route is mounted (default: none).
    #[serde(default)]
    pub webpath: String,

    /// Path of the metrics endpoint below the webpath (default: "/metrics").
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,

    /// Public URL of the exporter behind a reverse proxy, logged at startup.
    #[serde(default)]
    pub public_url: Option<String>,

    /// Use `X-Forwarded-Host` for the host check when present (default: true).
    #[serde(default = "default_true")]
    pub trust_forwarded_host: bool,

    /// Contact published in `/.well-known/security.txt`.
    #[serde(default)]
    pub security_contact: Option<String>,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            hostname: String::new(),
            webpath: String::new(),
            metrics_path: default_metrics_path(),
            public_url: None,
            trust_forwarded_host: true,
            security_contact: None,
        }
    }
}

impl HttpConfig {
    /// The webpath as `/segment/...` without a trailing slash, or `/`.
    pub fn normalized_webpath(&self) -> String {
        normalize_webpath(&self.webpath)
    }
}

/// Normalize a route prefix: `"metrics/"`, `"/metrics"` and `"\metrics"`
/// all become `/metrics`, an empty prefix becomes `/`.
pub fn normalize_webpath(webpath: &str) -> String {
    let webpath = webpath.replace('\\', "/");
    let trimmed = webpath.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Synchronization strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Follow the hub's event stream.
    #[default]
    Events,
    /// Reconcile against the hub on every scrape.
    Poll,
}

/// Synchronization configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub mode: SyncMode,

    /// First delay before reconnecting the event stream (default: 1s).
    #[serde(default = "default_initial_delay")]
    pub reconnect_initial_delay_secs: u64,

    /// Upper bound of the reconnection delay (default: 30s).
    #[serde(default = "default_max_delay")]
    pub reconnect_max_delay_secs: u64,
}

fn default_initial_delay() -> u64 {
    1
}

fn default_max_delay() -> u64 {
    30
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::default(),
            reconnect_initial_delay_secs: default_initial_delay(),
            reconnect_max_delay_secs: default_max_delay(),
        }
    }
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Ok(load_config(path)?)
    }

    /// Parse configuration from a JSON5 string.
    ///
    /// The result is not validated: required values may still come from
    /// the command line.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(parse_config(content)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hub.address.trim().is_empty() {
            return Err(ConfigError::Validation(
                "hub.address is required".to_string(),
            ));
        }

        if self.hub.token.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation("hub.token is required".to_string()));
        }

        if self.hub.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "hub.timeout_secs must be > 0".to_string(),
            ));
        }

        if self.http.hostname.trim().is_empty() {
            return Err(ConfigError::Validation(
                "http.hostname is required".to_string(),
            ));
        }

        // Validate listen address format
        if self.http.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.http.listen
            )));
        }

        // Validate path starts with /
        if !self.http.metrics_path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        if self.sync.reconnect_initial_delay_secs > self.sync.reconnect_max_delay_secs {
            return Err(ConfigError::Validation(
                "sync.reconnect_initial_delay_secs must not exceed reconnect_max_delay_secs"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirigera_common::LogFormat;

    const MINIMAL: &str = r#"{
        hub: { address: "192.168.1.20", token: "secret" },
        http: { hostname: "metrics.example.org" }
    }"#;

    #[test]
    fn test_parse_minimal_config() {
        let config = ExporterConfig::parse(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.hub.port, 8443);
        assert_eq!(config.hub.timeout_secs, 10);
        assert!(config.hub.accept_invalid_certs);
        assert_eq!(config.http.listen, "0.0.0.0:8080");
        assert_eq!(config.http.metrics_path, "/metrics");
        assert_eq!(config.http.normalized_webpath(), "/");
        assert!(config.http.trust_forwarded_host);
        assert_eq!(config.sync.mode, SyncMode::Events);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            hub: {
                address: "dirigera.local",
                token: "secret",
                port: 9443,
                timeout_secs: 5,
                accept_invalid_certs: false,
            },
            http: {
                listen: "127.0.0.1:9100",
                hostname: "metrics.example.org",
                webpath: "/dirigera/",
                public_url: "https://metrics.example.org/dirigera/",
                trust_forwarded_host: false,
                security_contact: "mailto:security@example.org",
            },
            sync: {
                mode: "poll",
                reconnect_initial_delay_secs: 2,
                reconnect_max_delay_secs: 60,
            },
            logging: {
                level: "debug",
                format: "json"
            }
        }"#;

        let config = ExporterConfig::parse(json).unwrap();
        config.validate().unwrap();

        assert_eq!(config.hub.token.expose_secret(), "secret");
        assert_eq!(config.hub.settings().port, 9443);
        assert_eq!(config.hub.settings().timeout, Duration::from_secs(5));
        assert!(!config.hub.settings().accept_invalid_certs);
        assert_eq!(config.http.normalized_webpath(), "/dirigera");
        assert_eq!(
            config.http.security_contact.as_deref(),
            Some("mailto:security@example.org")
        );
        assert_eq!(config.sync.mode, SyncMode::Poll);
        assert_eq!(config.sync.reconnect_max_delay_secs, 60);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_token_is_redacted() {
        let config = ExporterConfig::parse(MINIMAL).unwrap();
        assert!(!format!("{:?}", config).contains("secret\""));
    }

    #[test]
    fn test_validate_missing_hub() {
        let config = ExporterConfig::parse(r#"{ http: { hostname: "h" } }"#).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("hub.address"));
    }

    #[test]
    fn test_validate_missing_token() {
        let config =
            ExporterConfig::parse(r#"{ hub: { address: "hub" }, http: { hostname: "h" } }"#)
                .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("hub.token"));
    }

    #[test]
    fn test_validate_missing_hostname() {
        let config =
            ExporterConfig::parse(r#"{ hub: { address: "hub", token: "t" } }"#).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("http.hostname"));
    }

    #[test]
    fn test_validate_invalid_listen() {
        let mut config = ExporterConfig::parse(MINIMAL).unwrap();
        config.http.listen = "not-an-address".to_string();

        let result = config.validate();
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid listen address")
        );
    }

    #[test]
    fn test_validate_invalid_path() {
        let mut config = ExporterConfig::parse(MINIMAL).unwrap();
        config.http.metrics_path = "no-leading-slash".to_string();

        let result = config.validate();
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("must start with /")
        );
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = ExporterConfig::parse(MINIMAL).unwrap();
        config.hub.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_reconnect_delays() {
        let mut config = ExporterConfig::parse(MINIMAL).unwrap();
        config.sync.reconnect_initial_delay_secs = 60;
        config.sync.reconnect_max_delay_secs = 30;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_normalize_webpath() {
        assert_eq!(normalize_webpath(""), "/");
        assert_eq!(normalize_webpath("/"), "/");
        assert_eq!(normalize_webpath("dirigera"), "/dirigera");
        assert_eq!(normalize_webpath("/a/b/"), "/a/b");
        assert_eq!(normalize_webpath("\\a\\b"), "/a/b");
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = ExporterConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.hub.address, "192.168.1.20");
    }
}
