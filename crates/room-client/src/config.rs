//! Client configuration.
//!
//! Same loading rules as the service: environment variables with a
//! `DEFAULT_*` fallback for every value.

use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default signaling endpoint.
pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:3001/ws";

/// Default local cap on a shared file (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Default quiet period after the last keystroke before `typing-stop`.
pub const DEFAULT_TYPING_IDLE_MILLIS: u64 = 2000;

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// WebSocket URL of the room service (default: `ws://127.0.0.1:3001/ws`).
    pub server_url: String,

    /// Largest file the client will try to share (default: 10 MiB).
    pub max_upload_bytes: usize,

    /// Idle time that ends a typing burst (default: 2000ms).
    pub typing_idle_millis: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            typing_idle_millis: DEFAULT_TYPING_IDLE_MILLIS,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let server_url = vars
            .get("ROOM_SERVER_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());

        let max_upload_bytes = vars
            .get("ROOM_CLIENT_MAX_UPLOAD_BYTES")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        let typing_idle_millis = vars
            .get("ROOM_TYPING_IDLE_MILLIS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TYPING_IDLE_MILLIS);

        if !(server_url.starts_with("ws://") || server_url.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue(format!(
                "ROOM_SERVER_URL must be a ws:// or wss:// URL, got {server_url}"
            )));
        }

        if typing_idle_millis == 0 {
            return Err(ConfigError::InvalidValue(
                "ROOM_TYPING_IDLE_MILLIS must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            server_url,
            max_upload_bytes,
            typing_idle_millis,
        })
    }

    #[must_use]
    pub fn typing_idle(&self) -> Duration {
        Duration::from_millis(self.typing_idle_millis)
    }
}
