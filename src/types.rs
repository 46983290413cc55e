//! Basic type definitions for the chat hub
//!
//! Provides newtype wrappers for type safety:
//! - `SessionId`: UUID-based unique connection identifier
//! - `Nickname`: validated, case-sensitive member name

use uuid::Uuid;

use crate::error::AppError;

/// Minimum nickname length in characters
pub const MIN_NICKNAME_LEN: usize = 2;

/// Maximum nickname length in characters
pub const MAX_NICKNAME_LEN: usize = 20;

/// Sender name used for room notices. Reserved case-insensitively.
pub const SYSTEM_SENDER: &str = "System";

/// Unique session identifier (newtype pattern)
///
/// Wraps a UUID v4 so every accepted connection can be told apart in logs,
/// even before it has a nickname.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Member nickname
///
/// Only constructed through validation, so holding a `Nickname` means the
/// value is within bounds, uses the allowed charset and is not "system".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Nickname(String);

impl Nickname {
    /// Validate a candidate against the default length bounds
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        Self::parse_bounded(raw, MIN_NICKNAME_LEN, MAX_NICKNAME_LEN)
    }

    /// Validate a candidate against explicit length bounds
    pub fn parse_bounded(raw: &str, min: usize, max: usize) -> Result<Self, AppError> {
        if raw.is_empty() {
            return Err(AppError::NicknameEmpty);
        }

        let len = raw.chars().count();
        if len < min {
            return Err(AppError::NicknameTooShort { min });
        }
        if len > max {
            return Err(AppError::NicknameTooLong { max });
        }

        if raw.eq_ignore_ascii_case(SYSTEM_SENDER) {
            return Err(AppError::NicknameReserved);
        }

        let valid_chars = raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid_chars {
            return Err(AppError::NicknameCharset);
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Nickname {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_unique() {
        let id1 = SessionId::new();
        let id2 = SessionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_nickname_accepts_valid_names() {
        for name in ["al", "alice", "Bob_99", "x-y-z", "abcdefghijklmnopqrst"] {
            let nick = Nickname::parse(name).unwrap();
            assert_eq!(nick.as_str(), name);
        }
    }

    #[test]
    fn test_nickname_length_bounds() {
        assert!(matches!(Nickname::parse(""), Err(AppError::NicknameEmpty)));
        assert!(matches!(
            Nickname::parse("a"),
            Err(AppError::NicknameTooShort { min: 2 })
        ));
        assert!(matches!(
            Nickname::parse("abcdefghijklmnopqrstu"),
            Err(AppError::NicknameTooLong { max: 20 })
        ));
    }

    #[test]
    fn test_nickname_system_reserved_case_insensitive() {
        for name in ["system", "System", "SYSTEM", "sYsTeM"] {
            assert!(matches!(
                Nickname::parse(name),
                Err(AppError::NicknameReserved)
            ));
        }
        // Only the exact word is reserved
        assert!(Nickname::parse("systems").is_ok());
    }

    #[test]
    fn test_nickname_charset() {
        for name in ["al ice", "bob!", "café", "a.b", "<script>"] {
            assert!(matches!(
                Nickname::parse(name),
                Err(AppError::NicknameCharset)
            ));
        }
    }

    #[test]
    fn test_nickname_case_sensitive() {
        let lower = Nickname::parse("alice").unwrap();
        let upper = Nickname::parse("Alice").unwrap();
        assert_ne!(lower, upper);
    }

    #[test]
    fn test_nickname_custom_bounds() {
        assert!(Nickname::parse_bounded("abc", 4, 8).is_err());
        assert!(Nickname::parse_bounded("abcd", 4, 8).is_ok());
    }
}
