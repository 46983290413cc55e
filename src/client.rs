//! Member and outbound connection definitions
//!
//! `Outbound` is the write half of one connection. Broadcast deliveries and
//! the session's own replies both go through it, so writes never interleave.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::SendError;
use crate::message::ChatMessage;
use crate::render;
use crate::types::{Nickname, SessionId};

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Shared, lock-guarded write path for one connection
///
/// Cloning yields another handle to the same connection. `None` inside the
/// lock means the connection has been closed.
#[derive(Clone)]
pub struct Outbound {
    writer: Arc<Mutex<Option<BoxedWriter>>>,
    write_timeout: Duration,
}

impl Outbound {
    /// Wrap a connection's write half
    pub fn new<W>(writer: W, write_timeout: Duration) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            writer: Arc::new(Mutex::new(Some(Box::new(writer)))),
            write_timeout,
        }
    }

    /// Write text as-is and flush (used for prompts)
    ///
    /// A write that fails or times out closes the connection, so later
    /// writes fail fast with `Closed` instead of queueing on the lock.
    pub async fn write_raw(&self, text: &str) -> Result<(), SendError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(SendError::Closed)?;

        let write = async {
            writer.write_all(text.as_bytes()).await?;
            writer.flush().await
        };
        let err = match tokio::time::timeout(self.write_timeout, write).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => SendError::Io(e),
            Err(_) => SendError::TimedOut,
        };

        // The peer may hold a partial line; nothing else may follow it
        drop(guard.take());
        Err(err)
    }

    /// Write text with every line terminated by CRLF
    pub async fn send_lines(&self, text: &str) -> Result<(), SendError> {
        self.write_raw(&render::crlf(text)).await
    }

    /// Render and write a room event
    pub async fn send_message(&self, message: &ChatMessage) -> Result<(), SendError> {
        self.send_lines(&render::message(message)).await
    }

    /// Write a `[System]` notice
    pub async fn send_notice(&self, text: &str) -> Result<(), SendError> {
        self.send_message(&ChatMessage::system(text)).await
    }

    /// Close the connection. Only the first call has any effect.
    pub async fn close(&self) {
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                debug!("Error shutting down writer: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbound")
            .field("write_timeout", &self.write_timeout)
            .finish_non_exhaustive()
    }
}

/// Admitted room participant
///
/// Owned by the room once admitted; the session keeps its own `Outbound`
/// clone for replies but cannot touch membership.
#[derive(Debug, Clone)]
pub struct Member {
    /// Session that owns this member
    pub session_id: SessionId,
    /// Unique key in the room
    pub nickname: Nickname,
    /// Where broadcasts are delivered
    pub sink: Outbound,
}

impl Member {
    pub fn new(session_id: SessionId, nickname: Nickname, sink: Outbound) -> Self {
        Self {
            session_id,
            nickname,
            sink,
        }
    }

    /// Deliver a room event, logging instead of failing
    ///
    /// A stalled or closed member only loses this delivery.
    pub async fn deliver(&self, message: &ChatMessage) {
        if let Err(e) = self.sink.send_message(message).await {
            debug!("Delivery to {} ({}) failed: {}", self.nickname, self.session_id, e);
        }
    }
}
