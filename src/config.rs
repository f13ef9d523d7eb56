//! # Configuration Management
//!
//! Centralized configuration for the discovery client.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()` (`DISCOVERY_*`)
//!
//! ## Defaults
//! - Load balancer at `127.0.0.1:8000`, node credentials `loadbalancer`
//! - 8 KB socket buffers with `TCP_NODELAY`
//! - 5 Hz tick (200 ms) with a 2.5 ms busy-yield margin

use crate::error::{ProtocolError, Result};
use crate::protocol::handshake::Credentials;
use crate::transport::SOCKET_BUFFER_SIZE;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DiscoveryConfig {
    /// Load-balancer endpoint and node credentials
    #[serde(default)]
    pub client: ClientConfig,

    /// Socket configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Tick loop configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DiscoveryConfig {
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

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Override fields from `DISCOVERY_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("DISCOVERY_HOST") {
            self.client.host = host;
        }

        if let Ok(port) = std::env::var("DISCOVERY_PORT") {
            if let Ok(val) = port.parse::<u16>() {
                self.client.port = val;
            }
        }

        if let Ok(username) = std::env::var("DISCOVERY_USERNAME") {
            self.client.username = username;
        }

        if let Ok(password) = std::env::var("DISCOVERY_PASSWORD") {
            self.client.password = password;
        }

        if let Ok(interval) = std::env::var("DISCOVERY_TICK_INTERVAL_MS") {
            if let Ok(val) = interval.parse::<u64>() {
                self.engine.tick_interval = Duration::from_millis(val);
            }
        }
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
        errors.extend(self.engine.validate());
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

/// Load-balancer endpoint and node credentials
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Load-balancer host name or IP
    pub host: String,

    /// Load-balancer port
    pub port: u16,

    /// Service account presented during the handshake
    pub username: String,

    /// Service account password
    pub password: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let credentials = Credentials::default();
        Self {
            host: String::from("127.0.0.1"),
            port: 8000,
            username: credentials.username,
            password: credentials.password.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.username.clone(), self.password.clone())
    }

    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.is_empty() {
            errors.push("Load balancer host cannot be empty".to_string());
        }

        if self.port == 0 {
            errors.push("Load balancer port cannot be 0".to_string());
        }

        if self.username.is_empty() {
            errors.push("Username cannot be empty".to_string());
        } else if self.username.contains('\0') {
            errors.push("Username cannot contain NUL bytes".to_string());
        }

        errors
    }
}

/// Socket configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Disable Nagle coalescing
    pub nodelay: bool,

    /// Kernel send buffer size in bytes
    pub send_buffer_size: usize,

    /// Kernel receive buffer size in bytes
    pub recv_buffer_size: usize,

    /// Upper bound on a blocking connect, 5 s when left out; `None` waits
    /// for the OS timeout
    #[serde(default = "default_connect_timeout", with = "option_duration_serde")]
    pub connect_timeout: Option<Duration>,

    /// Close the link when the framer hits an invalid header instead of
    /// leaving the bytes for the next read
    pub close_on_framing_error: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            nodelay: true,
            send_buffer_size: SOCKET_BUFFER_SIZE,
            recv_buffer_size: SOCKET_BUFFER_SIZE,
            connect_timeout: default_connect_timeout(),
            close_on_framing_error: true,
        }
    }
}

fn default_connect_timeout() -> Option<Duration> {
    Some(Duration::from_secs(5))
}

impl TransportConfig {
    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.send_buffer_size < 1024 {
            errors.push("Send buffer size too small (minimum: 1 KB)".to_string());
        }

        if self.recv_buffer_size < 1024 {
            errors.push("Receive buffer size too small (minimum: 1 KB)".to_string());
        }

        if let Some(timeout) = self.connect_timeout {
            if timeout.as_millis() < 100 {
                errors.push("Connect timeout too short (minimum: 100ms)".to_string());
            } else if timeout.as_secs() > 300 {
                errors.push("Connect timeout too long (maximum: 300s)".to_string());
            }
        }

        errors
    }
}

/// Tick loop configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Target period between ticks
    #[serde(with = "duration_serde")]
    pub tick_interval: Duration,

    /// Portion of the period spent busy-yielding instead of sleeping
    #[serde(with = "micros_serde")]
    pub sleep_margin: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(200),
            sleep_margin: Duration::from_micros(2500),
        }
    }
}

impl EngineConfig {
    /// Validate engine configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.tick_interval.as_millis() < 1 {
            errors.push("Tick interval too short (minimum: 1ms)".to_string());
        } else if self.tick_interval.as_secs() > 60 {
            errors.push("Tick interval too long (maximum: 60s)".to_string());
        }

        if self.sleep_margin > self.tick_interval {
            errors.push("Sleep margin cannot exceed the tick interval".to_string());
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

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("discovery-client"),
            log_level: Level::INFO,
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
        let millis = duration.as_millis() as u64;
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

/// Sub-millisecond durations, stored as microseconds
mod micros_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_micros() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_micros(u64::deserialize(deserializer)?))
    }
}

mod option_duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
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
