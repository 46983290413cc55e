//! Message definitions
//!
//! `ChatMessage` is the immutable event fanned out by the room.
//! `Command` is the parsed form of an inbound line that starts with `/`.

use chrono::{DateTime, Local};

use crate::error::AppError;
use crate::types::{Nickname, SYSTEM_SENDER};

/// Variant tag for a chat event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Ordinary line typed by a member
    User,
    /// `/me` action
    Action,
    /// Room notice (joins, leaves, errors)
    System,
}

/// Room event
///
/// Created at submission time and never mutated afterwards; history and
/// every recipient get their own clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub from: String,
    pub content: String,
    pub timestamp: DateTime<Local>,
    pub kind: MessageKind,
}

impl ChatMessage {
    /// Message typed by a member
    pub fn user(from: &Nickname, content: impl Into<String>) -> Self {
        Self::new(from.as_str(), content, MessageKind::User)
    }

    /// `/me` action performed by a member
    pub fn action(from: &Nickname, content: impl Into<String>) -> Self {
        Self::new(from.as_str(), content, MessageKind::Action)
    }

    /// Notice attributed to the room itself
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(SYSTEM_SENDER, content, MessageKind::System)
    }

    fn new(from: &str, content: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            from: from.to_string(),
            content: content.into(),
            timestamp: Local::now(),
            kind,
        }
    }

    pub fn is_system(&self) -> bool {
        self.kind == MessageKind::System
    }
}

/// Slash command entered by an active member
///
/// Keywords are matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List members and capacity
    Who,
    /// Broadcast an action
    Me(String),
    /// Show available commands
    Help,
    /// Leave the room
    Quit,
    /// Anything else starting with `/`
    Unknown(String),
}

impl Command {
    /// Parse a trimmed line that starts with `/`
    ///
    /// A blank `/me` is a usage error rather than a command.
    pub fn parse(line: &str) -> Result<Self, AppError> {
        let (keyword, rest) = match line.split_once(' ') {
            Some((keyword, rest)) => (keyword, Some(rest)),
            None => (line, None),
        };
        let keyword = keyword.to_lowercase();

        let command = match keyword.as_str() {
            "/who" => Command::Who,
            "/me" => {
                let action = rest.map(str::trim).unwrap_or_default();
                if action.is_empty() {
                    return Err(AppError::Usage("/me <action>"));
                }
                Command::Me(action.to_string())
            }
            "/help" => Command::Help,
            "/quit" => Command::Quit,
            _ => Command::Unknown(keyword),
        };
        Ok(command)
    }

    /// Quit is exempt from rate limiting
    pub fn is_quit(line: &str) -> bool {
        line.split(' ')
            .next()
            .is_some_and(|keyword| keyword.eq_ignore_ascii_case("/quit"))
    }
}
