//! Error types for the chat hub
//!
//! Defines application-level errors and outbound write errors.
//! Uses thiserror for ergonomic error definitions.

use std::time::Duration;

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Application-level errors
///
/// Covers both fatal errors (session termination) and
/// local errors (reported to the originating session only).
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing error on the inbound stream (fatal)
    #[error("Line codec error: {0}")]
    Codec(#[from] LinesCodecError),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Nickname cannot be empty. Please try again.")]
    NicknameEmpty,

    #[error("Nickname must be at least {min} characters.")]
    NicknameTooShort { min: usize },

    #[error("Nickname must be at most {max} characters.")]
    NicknameTooLong { max: usize },

    #[error("Nickname 'System' is reserved. Please choose another nickname.")]
    NicknameReserved,

    #[error("Nickname can only contain letters, numbers, underscores, and hyphens.")]
    NicknameCharset,

    #[error("Nickname '{0}' is already taken. Please choose another nickname.")]
    NicknameTaken(String),

    #[error("message too long (max {max} characters)")]
    MessageTooLong { max: usize },

    #[error(
        "rate limit exceeded (max {limit} messages per {}s). Try again in {:.1} seconds",
        .window.as_secs(),
        .retry_after.as_secs_f64()
    )]
    RateLimited {
        limit: usize,
        window: Duration,
        retry_after: Duration,
    },

    /// Command used with missing or blank arguments
    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Room is at capacity
    #[error("Room is full")]
    RoomFull,

    /// Room control loop has stopped
    #[error("Room is closed")]
    RoomClosed,

    /// Peer went away
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Failure classes, used to decide who sees an error and whether it ends
/// the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad nickname or message; reported to the sender only
    Validation,
    /// Room full; ends the admitting session only
    Capacity,
    /// Too many messages; reported with a retry delay
    RateLimit,
    /// Transport failure; ends the owning session
    Connection,
    /// Room already stopped; silently ignored
    Shutdown,
    /// Startup configuration problem
    Config,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Io(_) | AppError::Codec(_) | AppError::ConnectionClosed => {
                ErrorKind::Connection
            }
            AppError::ConfigParse(_) | AppError::Config(_) => ErrorKind::Config,
            AppError::NicknameEmpty
            | AppError::NicknameTooShort { .. }
            | AppError::NicknameTooLong { .. }
            | AppError::NicknameReserved
            | AppError::NicknameCharset
            | AppError::NicknameTaken(_)
            | AppError::MessageTooLong { .. }
            | AppError::Usage(_)
            | AppError::UnknownCommand(_) => ErrorKind::Validation,
            AppError::RateLimited { .. } => ErrorKind::RateLimit,
            AppError::RoomFull => ErrorKind::Capacity,
            AppError::RoomClosed => ErrorKind::Shutdown,
        }
    }

    /// Whether this error should end the session that hit it
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Connection | ErrorKind::Capacity | ErrorKind::Shutdown
        )
    }

    /// Text shown to the member as a system notice
    pub fn notice(&self) -> String {
        match self {
            AppError::MessageTooLong { .. } | AppError::RateLimited { .. } => {
                format!("Error: {}", self)
            }
            AppError::RoomFull => "Sorry, the room is full. Try again later.".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<SendError> for AppError {
    fn from(err: SendError) -> Self {
        match err {
            SendError::Io(e) => AppError::Io(e),
            SendError::Closed | SendError::TimedOut => AppError::ConnectionClosed,
        }
    }
}

/// Outbound write errors
///
/// Occurs when writing to a member's connection.
#[derive(Debug, Error)]
pub enum SendError {
    /// The connection has already been closed
    #[error("Connection closed")]
    Closed,

    /// The peer did not accept the write in time
    #[error("Write timed out")]
    TimedOut,

    #[error("Write failed: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(AppError::NicknameReserved.kind(), ErrorKind::Validation);
        assert_eq!(AppError::RoomFull.kind(), ErrorKind::Capacity);
        assert_eq!(AppError::RoomClosed.kind(), ErrorKind::Shutdown);
        assert_eq!(AppError::ConnectionClosed.kind(), ErrorKind::Connection);
        assert!(!AppError::UnknownCommand("/x".into()).is_fatal());
        assert!(AppError::RoomFull.is_fatal());
    }

    #[test]
    fn test_rate_limit_notice() {
        let err = AppError::RateLimited {
            limit: 5,
            window: Duration::from_secs(5),
            retry_after: Duration::from_millis(2500),
        };
        assert_eq!(
            err.notice(),
            "Error: rate limit exceeded (max 5 messages per 5s). Try again in 2.5 seconds"
        );
    }

    #[test]
    fn test_send_error_maps_to_connection() {
        let err: AppError = SendError::TimedOut.into();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }
}
