//! Plain-text presentation
//!
//! Turns room events and command results into display text. Functions
//! return `\n`-separated text; the write path converts it to CRLF.

use crate::message::{ChatMessage, MessageKind};
use crate::types::Nickname;

pub const NICKNAME_PROMPT: &str = "Please enter your nickname: ";
pub const INPUT_PROMPT: &str = "> ";
pub const HISTORY_HEADER: &str = "--- Recent messages ---";
pub const HISTORY_FOOTER: &str = "--- End of history ---";
pub const FAREWELL: &str = "Goodbye!";

/// Render a room event as a single display line
pub fn message(msg: &ChatMessage) -> String {
    match msg.kind {
        MessageKind::System => format!("[System] {}", msg.content),
        MessageKind::Action => format!("* {} {}", msg.from, msg.content),
        MessageKind::User => format!(
            "[{}] {}: {}",
            msg.timestamp.format("%H:%M:%S"),
            msg.from,
            msg.content
        ),
    }
}

/// History replay block: header, one line per message, footer
pub fn history(messages: &[ChatMessage]) -> String {
    let mut lines = Vec::with_capacity(messages.len() + 2);
    lines.push(message(&ChatMessage::system(HISTORY_HEADER)));
    lines.extend(messages.iter().map(message));
    lines.push(message(&ChatMessage::system(HISTORY_FOOTER)));
    lines.join("\n")
}

pub fn title(text: &str) -> String {
    format!("=== {} ===", text)
}

pub fn help() -> String {
    [
        "Available Commands:",
        "  /who - Show all users in the room",
        "  /me <action> - Perform an action",
        "  /help - Show this help message",
        "  /quit - Leave the chat",
    ]
    .join("\n")
}

pub fn user_list(room_name: &str, members: &[Nickname], max_members: usize) -> String {
    let mut content = format!(
        "Users in {} ({}/{}):",
        room_name,
        members.len(),
        max_members
    );
    for member in members {
        content.push_str("\n- ");
        content.push_str(member.as_str());
    }
    content
}

pub fn welcome(room_name: &str, nickname: &Nickname) -> String {
    format!(
        "Welcome to {}, {}!\n\nType a message and press Enter to send. Use /help to see available commands.",
        room_name, nickname
    )
}

/// Terminate every line with CRLF, normalising bare `\n` and `\r\n`
pub fn crlf(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for line in text.split('\n') {
        out.push_str(line.strip_suffix('\r').unwrap_or(line));
        out.push_str("\r\n");
    }
    out
}
