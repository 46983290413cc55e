//! Runtime configuration
//!
//! Every struct is `#[serde(default)]`, so a JSON file only needs the keys
//! it wants to change.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;
use crate::types::{MAX_NICKNAME_LEN, MIN_NICKNAME_LEN};

/// Default listen address
pub const DEFAULT_ADDR: &str = "0.0.0.0:2323";

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_addr: String,
    pub room: RoomConfig,
    pub session: SessionConfig,
    /// How long shutdown waits for sessions and deliveries to finish
    pub shutdown_budget_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_ADDR.to_string(),
            room: RoomConfig::default(),
            session: SessionConfig::default(),
            shutdown_budget_ms: 5_000,
        }
    }
}

impl Config {
    /// Load and validate a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, AppError> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.room.validate()?;
        self.session.validate()?;
        if self.shutdown_budget_ms == 0 {
            return Err(AppError::Config("shutdown_budget_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn shutdown_budget(&self) -> Duration {
        Duration::from_millis(self.shutdown_budget_ms)
    }
}

/// Room settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Display name
    pub name: String,
    /// Maximum concurrent admitted members
    pub max_members: usize,
    pub history_enabled: bool,
    pub history_size: usize,
    /// Control loop inbox size
    pub command_buffer: usize,
    /// How long stop waits for outstanding deliveries
    pub drain_timeout_ms: u64,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            name: "Chat Room".to_string(),
            max_members: 10,
            history_enabled: false,
            history_size: 50,
            command_buffer: 256,
            drain_timeout_ms: 5_000,
        }
    }
}

impl RoomConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_members == 0 {
            return Err(AppError::Config("room.max_members must be positive".into()));
        }
        if self.history_enabled && self.history_size == 0 {
            return Err(AppError::Config(
                "room.history_size must be positive when history is enabled".into(),
            ));
        }
        if self.command_buffer == 0 {
            return Err(AppError::Config("room.command_buffer must be positive".into()));
        }
        if self.drain_timeout_ms == 0 {
            return Err(AppError::Config("room.drain_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Per-connection protocol settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum chat line length in characters
    pub max_message_len: usize,
    /// Messages allowed per window
    pub rate_limit: usize,
    pub rate_window_ms: u64,
    pub min_nickname_len: usize,
    pub max_nickname_len: usize,
    /// Read wake-up interval for liveness checks
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    /// Hard cap on a raw inbound line, in bytes
    pub max_line_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_message_len: 1000,
            rate_limit: 5,
            rate_window_ms: 5_000,
            min_nickname_len: MIN_NICKNAME_LEN,
            max_nickname_len: MAX_NICKNAME_LEN,
            read_timeout_ms: 30_000,
            write_timeout_ms: 10_000,
            max_line_bytes: 8_192,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.min_nickname_len == 0 || self.min_nickname_len > self.max_nickname_len {
            return Err(AppError::Config(format!(
                "invalid nickname bounds {}..={}",
                self.min_nickname_len, self.max_nickname_len
            )));
        }
        if self.rate_limit == 0 || self.rate_window_ms == 0 {
            return Err(AppError::Config("rate limit and window must be positive".into()));
        }
        if self.read_timeout_ms == 0 || self.write_timeout_ms == 0 {
            return Err(AppError::Config("timeouts must be positive".into()));
        }
        if self.max_line_bytes < self.max_message_len {
            return Err(AppError::Config(
                "session.max_line_bytes must be at least max_message_len".into(),
            ));
        }
        Ok(())
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_millis(self.rate_window_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}
