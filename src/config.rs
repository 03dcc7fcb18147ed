//! # Configuration Management
//!
//! Centralized configuration for the FunXMPP client.
//!
//! This module provides structured configuration for the session, the TCP
//! transport and logging. The client itself only consumes a [`Config`] value;
//! where it comes from is up to the application.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - TOML strings via `from_toml()`
//! - Environment variables (`FUNXMPP_*`) via `from_env()`
//! - Direct instantiation with defaults
//!
//! Durations are written as integer milliseconds.

use crate::error::{ProtocolError, Result};
use crate::protocol::stanza::SERVER_DOMAIN;
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// Endpoint the client connects to
pub const DEFAULT_HOST: &str = "c.whatsapp.net";

/// Ports tried in rotation
pub const DEFAULT_PORTS: [u16; 2] = [443, 5222];

/// Client version announced in the stream preamble
pub const CLIENT_VERSION: &str = "Android-2.8.5732";

/// Connection attempts per login
pub const DEFAULT_CONNECT_TRIES: u32 = 3;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Session configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Transport configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ProtocolError::ConfigError(format!("Invalid value for {key}: {raw:?}"))),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables on top of the defaults.
    ///
    /// Recognised: `FUNXMPP_HOST`, `FUNXMPP_PORTS` (comma separated),
    /// `FUNXMPP_CONNECT_TRIES`, `FUNXMPP_CONNECT_TIMEOUT_MS`, `FUNXMPP_SERVER`,
    /// `FUNXMPP_POLL_INTERVAL_MS`, `FUNXMPP_REQUEST_TIMEOUT_MS`, `FUNXMPP_LOG_LEVEL`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("FUNXMPP_HOST") {
            config.transport.host = host;
        }

        if let Ok(ports) = std::env::var("FUNXMPP_PORTS") {
            config.transport.ports = ports
                .split(',')
                .map(|p| {
                    p.trim().parse::<u16>().map_err(|_| {
                        ProtocolError::ConfigError(format!("Invalid port in FUNXMPP_PORTS: {p:?}"))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
        }

        if let Some(tries) = env_parse::<u32>("FUNXMPP_CONNECT_TRIES")? {
            config.transport.connect_tries = tries;
        }

        if let Some(ms) = env_parse::<u64>("FUNXMPP_CONNECT_TIMEOUT_MS")? {
            config.transport.connect_timeout = Duration::from_millis(ms);
        }

        if let Ok(server) = std::env::var("FUNXMPP_SERVER") {
            config.client.server = server;
        }

        if let Some(ms) = env_parse::<u64>("FUNXMPP_POLL_INTERVAL_MS")? {
            config.client.poll_interval = Duration::from_millis(ms);
        }

        if let Some(ms) = env_parse::<u64>("FUNXMPP_REQUEST_TIMEOUT_MS")? {
            config.client.request_timeout = Duration::from_millis(ms);
        }

        if let Ok(level) = std::env::var("FUNXMPP_LOG_LEVEL") {
            config.logging.log_level = Level::from_str(&level)
                .map_err(|_| ProtocolError::ConfigError(format!("Invalid log level: {level}")))?;
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.client.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Domain named in the preamble, pongs and account addresses
    pub server: String,

    /// Client version string sent as the stream resource
    pub version: String,

    /// How long one pump waits for inbound bytes
    #[serde(with = "duration_serde")]
    pub poll_interval: Duration,

    /// Bound on login and on correlated requests such as last-seen queries
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: String::from(SERVER_DOMAIN),
            version: String::from(CLIENT_VERSION),
            poll_interval: timeout::POLL_INTERVAL,
            request_timeout: timeout::REQUEST_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Validate session configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.server.is_empty() {
            errors.push("Server domain cannot be empty".to_string());
        }

        if self.version.is_empty() {
            errors.push("Client version cannot be empty".to_string());
        }

        if self.poll_interval.is_zero() {
            errors.push("Poll interval must be greater than 0".to_string());
        } else if self.poll_interval.as_secs() > 10 {
            errors.push("Poll interval too long (maximum: 10s)".to_string());
        }

        if self.request_timeout < self.poll_interval {
            errors.push("Request timeout must not be shorter than the poll interval".to_string());
        }

        errors
    }
}

/// Transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Host name resolved for endpoint candidates
    pub host: String,

    /// Ports tried in rotation, one per resolution
    pub ports: Vec<u16>,

    /// Connection attempts per login
    pub connect_tries: u32,

    /// Timeout for a single connect attempt
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Initial capacity of the read buffer
    #[serde(default = "default_read_buffer")]
    pub read_buffer_size: usize,
}

fn default_read_buffer() -> usize {
    4096
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: String::from(DEFAULT_HOST),
            ports: DEFAULT_PORTS.to_vec(),
            connect_tries: DEFAULT_CONNECT_TRIES,
            connect_timeout: timeout::CONNECT_TIMEOUT,
            read_buffer_size: default_read_buffer(),
        }
    }
}

impl TransportConfig {
    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.is_empty() {
            errors.push("Host cannot be empty".to_string());
        }

        if self.ports.is_empty() {
            errors.push("At least one port must be configured".to_string());
        } else if self.ports.contains(&0) {
            errors.push("Port 0 is not a valid connection target".to_string());
        }

        if self.connect_tries == 0 {
            errors.push("Connect tries must be greater than 0".to_string());
        }

        if self.connect_timeout.as_millis() < 100 {
            errors.push("Connect timeout too short (minimum: 100ms)".to_string());
        } else if self.connect_timeout.as_secs() > 300 {
            errors.push("Connect timeout too long (maximum: 300s)".to_string());
        }

        if self.read_buffer_size < 512 {
            errors.push("Read buffer too small (minimum: 512 bytes)".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("funxmpp"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
