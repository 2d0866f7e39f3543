//! WebSocket types and configuration

use std::time::Duration;
use thiserror::Error;

/// WebSocket client configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// WebSocket URL to connect to
    pub url: String,
    /// Maximum reconnection attempts before giving up (0 = infinite)
    pub max_reconnect_attempts: u32,
    /// Initial delay before first reconnection attempt
    pub initial_reconnect_delay: Duration,
    /// Maximum delay between reconnection attempts
    pub max_reconnect_delay: Duration,
    /// Connection uptime after which the backoff resets to the initial delay
    pub stable_reset_after: Duration,
    /// Interval for sending ping frames
    pub ping_interval: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_reconnect_attempts: 0,
            initial_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(32),
            stable_reset_after: Duration::from_secs(10),
            ping_interval: Duration::from_secs(30),
        }
    }
}

impl WsConfig {
    /// Create a new config with the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set maximum reconnection attempts
    pub fn max_reconnects(mut self, n: u32) -> Self {
        self.max_reconnect_attempts = n;
        self
    }

    /// Set initial reconnection delay
    pub fn initial_delay(mut self, d: Duration) -> Self {
        self.initial_reconnect_delay = d;
        self
    }

    /// Set maximum reconnection delay
    pub fn max_delay(mut self, d: Duration) -> Self {
        self.max_reconnect_delay = d;
        self
    }

    /// Set the stable-streaming period that resets the backoff
    pub fn stable_reset(mut self, d: Duration) -> Self {
        self.stable_reset_after = d;
        self
    }

    /// Set ping interval
    pub fn ping_interval(mut self, d: Duration) -> Self {
        self.ping_interval = d;
        self
    }
}

/// WebSocket message types
#[derive(Debug, Clone)]
pub enum WsMessage {
    /// Text message
    Text(String),
    /// Binary message
    Binary(Vec<u8>),
    /// Connection established
    Connected,
    /// Connection closed for good
    Disconnected,
    /// Reconnecting after failure
    Reconnecting { attempt: u32 },
}

/// WebSocket errors
#[derive(Debug, Clone, Error)]
pub enum WsError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    /// Maximum reconnection attempts exceeded
    #[error("Maximum reconnection attempts exceeded")]
    MaxReconnectsExceeded,
    /// Send failed
    #[error("Send failed: {0}")]
    SendFailed(String),
}
