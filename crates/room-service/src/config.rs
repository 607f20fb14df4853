//! Room service configuration.
//!
//! Configuration is loaded from environment variables. Every value has a
//! default, so an empty environment yields a runnable local setup.

use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default signaling (WebSocket) bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3001";

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default interval between WebSocket pings.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECONDS: u64 = 25;

/// Default number of unanswered pings before the connection is dropped.
pub const DEFAULT_MAX_MISSED_HEARTBEATS: u32 = 2;

/// Default cap on a decoded shared file (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Default cap on a single inbound WebSocket message (16 MiB).
///
/// A 10 MiB file grows by a third when base64 encoded.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

/// Default time given to open sockets to close after a shutdown signal.
pub const DEFAULT_SHUTDOWN_GRACE_SECONDS: u64 = 5;

/// Room service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Signaling server bind address (default: "0.0.0.0:3001").
    pub bind_address: String,

    /// Health endpoint bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// Interval between heartbeat pings (default: 25s).
    pub heartbeat_interval_seconds: u64,

    /// Consecutive unanswered pings tolerated before disconnect (default: 2).
    pub max_missed_heartbeats: u32,

    /// Largest decoded file accepted by `file-share` (default: 10 MiB).
    pub max_upload_bytes: usize,

    /// Largest inbound WebSocket message (default: 16 MiB).
    pub max_message_bytes: usize,

    /// Grace period for draining sockets on shutdown (default: 5s).
    pub shutdown_grace_seconds: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            health_bind_address: DEFAULT_HEALTH_BIND_ADDRESS.to_string(),
            heartbeat_interval_seconds: DEFAULT_HEARTBEAT_INTERVAL_SECONDS,
            max_missed_heartbeats: DEFAULT_MAX_MISSED_HEARTBEATS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            shutdown_grace_seconds: DEFAULT_SHUTDOWN_GRACE_SECONDS,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("ROOM_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let health_bind_address = vars
            .get("ROOM_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let heartbeat_interval_seconds = vars
            .get("ROOM_HEARTBEAT_INTERVAL_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_SECONDS);

        let max_missed_heartbeats = vars
            .get("ROOM_MAX_MISSED_HEARTBEATS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_MISSED_HEARTBEATS);

        let max_upload_bytes = vars
            .get("ROOM_MAX_UPLOAD_BYTES")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        let max_message_bytes = vars
            .get("ROOM_MAX_MESSAGE_BYTES")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_MESSAGE_BYTES);

        let shutdown_grace_seconds = vars
            .get("ROOM_SHUTDOWN_GRACE_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SHUTDOWN_GRACE_SECONDS);

        if heartbeat_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "ROOM_HEARTBEAT_INTERVAL_SECONDS must be greater than zero".to_string(),
            ));
        }

        if max_missed_heartbeats == 0 {
            return Err(ConfigError::InvalidValue(
                "ROOM_MAX_MISSED_HEARTBEATS must be greater than zero".to_string(),
            ));
        }

        if max_message_bytes < max_upload_bytes {
            return Err(ConfigError::InvalidValue(format!(
                "ROOM_MAX_MESSAGE_BYTES ({max_message_bytes}) must not be smaller than \
                 ROOM_MAX_UPLOAD_BYTES ({max_upload_bytes})"
            )));
        }

        Ok(Config {
            bind_address,
            health_bind_address,
            heartbeat_interval_seconds,
            max_missed_heartbeats,
            max_upload_bytes,
            max_message_bytes,
            shutdown_grace_seconds,
        })
    }

    /// Heartbeat ping interval.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }
}
