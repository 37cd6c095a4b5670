//! Gateway client configuration.
//!
//! Configuration for the KOOK gateway client, including:
//! - Bot credential and API base URL
//! - Heartbeat cadence and failure tolerance
//! - Reconnect backoff and failure ceiling
//! - Socket timeouts, compression and frame size limits
//! - Logging output

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::{BotToken, DEFAULT_API_BASE_URL};
use crate::error::GatewayError;
use crate::gateway::{HeartbeatConfig, ReconnectConfig, SessionConfig};

/// Heartbeat settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HeartbeatSettings {
    /// Base interval between pings in seconds.
    pub interval_secs: u64,
    /// Symmetric random jitter applied to each interval, in seconds.
    pub jitter_secs: u64,
    /// How long to wait for a pong in seconds.
    pub timeout_secs: u64,
    /// Consecutive missed pongs before the connection is declared dead.
    pub max_failures: u32,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            jitter_secs: 5,
            timeout_secs: 6,
            max_failures: 3,
        }
    }
}

/// Reconnect settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReconnectSettings {
    /// Delay after the first failed attempt in seconds.
    pub initial_delay_secs: u64,
    /// Upper bound for the backoff delay in seconds.
    pub max_delay_secs: u64,
    /// Consecutive failed attempts before giving up.
    pub max_consecutive_failures: u32,
    /// Period of the forced session recycle in seconds; 0 disables it.
    pub recycle_interval_secs: u64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_delay_secs: 1,
            max_delay_secs: 60,
            max_consecutive_failures: 5,
            recycle_interval_secs: 3600,
        }
    }
}

/// Socket-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Upper bound of a single receive wait in seconds.
    pub receive_timeout_secs: u64,
    /// Timeout for establishing the WebSocket in seconds.
    pub connect_timeout_secs: u64,
    /// How long to wait for the hello signal in seconds.
    pub handshake_timeout_secs: u64,
    /// Ask the gateway for compressed frames.
    pub compression: bool,
    /// Largest accepted frame in bytes, compressed or inflated.
    pub max_message_size: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            receive_timeout_secs: 10,
            connect_timeout_secs: 30,
            handshake_timeout_secs: 6,
            compression: true,
            max_message_size: 1024 * 1024,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Main gateway client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Bot token. May instead come from the environment or the command line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Base URL of the HTTP API.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Heartbeat settings.
    #[serde(default)]
    pub heartbeat: HeartbeatSettings,
    /// Reconnect settings.
    #[serde(default)]
    pub reconnect: ReconnectSettings,
    /// Socket settings.
    #[serde(default)]
    pub connection: ConnectionSettings,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSettings,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base_url: default_api_base_url(),
            heartbeat: HeartbeatSettings::default(),
            reconnect: ReconnectSettings::default(),
            connection: ConnectionSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            GatewayError::Config(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, GatewayError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| GatewayError::Config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, GatewayError> {
        toml::to_string_pretty(self)
            .map_err(|e| GatewayError::Config(format!("failed to render TOML: {e}")))
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.token.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(GatewayError::Config("token cannot be empty".to_string()));
        }

        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err(GatewayError::Config(
                "api_base_url must start with http:// or https://".to_string(),
            ));
        }

        let hb = &self.heartbeat;
        if hb.interval_secs == 0 {
            return Err(GatewayError::Config(
                "heartbeat.interval_secs must be greater than 0".to_string(),
            ));
        }
        if hb.jitter_secs >= hb.interval_secs {
            return Err(GatewayError::Config(
                "heartbeat.jitter_secs must be less than heartbeat.interval_secs".to_string(),
            ));
        }
        if hb.timeout_secs == 0 || hb.timeout_secs >= hb.interval_secs - hb.jitter_secs {
            return Err(GatewayError::Config(
                "heartbeat.timeout_secs must be positive and shorter than the shortest interval"
                    .to_string(),
            ));
        }
        if hb.max_failures == 0 {
            return Err(GatewayError::Config(
                "heartbeat.max_failures must be greater than 0".to_string(),
            ));
        }

        let rc = &self.reconnect;
        if rc.initial_delay_secs == 0 {
            return Err(GatewayError::Config(
                "reconnect.initial_delay_secs must be greater than 0".to_string(),
            ));
        }
        if rc.max_delay_secs < rc.initial_delay_secs {
            return Err(GatewayError::Config(
                "reconnect.max_delay_secs cannot be less than reconnect.initial_delay_secs"
                    .to_string(),
            ));
        }
        if rc.max_consecutive_failures == 0 {
            return Err(GatewayError::Config(
                "reconnect.max_consecutive_failures must be greater than 0".to_string(),
            ));
        }

        let conn = &self.connection;
        if conn.receive_timeout_secs == 0
            || conn.connect_timeout_secs == 0
            || conn.handshake_timeout_secs == 0
        {
            return Err(GatewayError::Config(
                "connection timeouts must be greater than 0".to_string(),
            ));
        }
        if conn.max_message_size < 1024 {
            return Err(GatewayError::Config(
                "connection.max_message_size must be at least 1024 bytes".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolve the bot credential, preferring an explicit override.
    ///
    /// # Errors
    ///
    /// Returns an error if no token is configured anywhere.
    pub fn credential(&self, override_token: Option<&str>) -> Result<BotToken, GatewayError> {
        override_token
            .or(self.token.as_deref())
            .filter(|t| !t.trim().is_empty())
            .map(BotToken::new)
            .ok_or_else(|| {
                GatewayError::Config(
                    "no bot token: set `token` in the config file or KOOK_TOKEN".to_string(),
                )
            })
    }

    /// Runtime heartbeat configuration.
    #[must_use]
    pub const fn heartbeat_config(&self) -> HeartbeatConfig {
        HeartbeatConfig {
            interval: Duration::from_secs(self.heartbeat.interval_secs),
            jitter: Duration::from_secs(self.heartbeat.jitter_secs),
            ack_timeout: Duration::from_secs(self.heartbeat.timeout_secs),
            max_missed_acks: self.heartbeat.max_failures,
        }
    }

    /// Runtime reconnect configuration.
    #[must_use]
    pub const fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_secs(self.reconnect.initial_delay_secs),
            max_delay: Duration::from_secs(self.reconnect.max_delay_secs),
            backoff_multiplier: 2.0,
            max_consecutive_failures: self.reconnect.max_consecutive_failures,
        }
    }

    /// Runtime session configuration.
    #[must_use]
    pub const fn session_config(&self) -> SessionConfig {
        SessionConfig {
            receive_timeout: Duration::from_secs(self.connection.receive_timeout_secs),
            connect_timeout: Duration::from_secs(self.connection.connect_timeout_secs),
            handshake_timeout: Duration::from_secs(self.connection.handshake_timeout_secs),
            compression: self.connection.compression,
            max_message_size: self.connection.max_message_size,
            heartbeat: self.heartbeat_config(),
        }
    }

    /// Period of the forced session recycle, if enabled.
    #[must_use]
    pub const fn recycle_interval(&self) -> Option<Duration> {
        match self.reconnect.recycle_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
