//! Connection session
//!
//! Drives one connection from nickname negotiation through the message
//! loop to disconnect. The protocol has two live states,
//! `NegotiatingNickname` and `Active`; read errors, `/quit` and shutdown
//! all lead to `Closed`.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::FramedRead;
use tracing::{debug, info, trace};

use crate::client::{Member, Outbound};
use crate::codec::{Inbound, InboundCodec};
use crate::config::SessionConfig;
use crate::error::AppError;
use crate::message::{ChatMessage, Command};
use crate::rate_limit::RateLimiter;
use crate::render;
use crate::room::RoomHandle;
use crate::signal::Signal;
use crate::types::{Nickname, SessionId};

/// Protocol state of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    NegotiatingNickname,
    Active(Nickname),
    Closed,
}

/// What the input loop does after a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Handle a new connection
///
/// Runs the session to completion. The member is removed from the room
/// and the connection closed on every exit path.
pub async fn handle_connection<S>(
    stream: S,
    room: RoomHandle,
    config: Arc<SessionConfig>,
    shutdown: Signal,
) -> Result<(), AppError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let outbound = Outbound::new(writer, config.write_timeout());
    let mut session = ConnectionSession::new(reader, outbound, room, config, shutdown);

    info!("Session {} started", session.id());
    let result = session.run().await;
    session.terminate().await;
    info!("Session {} ended", session.id());

    result
}

/// Per-connection protocol state machine
pub struct ConnectionSession<R> {
    id: SessionId,
    lines: FramedRead<R, InboundCodec>,
    outbound: Outbound,
    room: RoomHandle,
    config: Arc<SessionConfig>,
    shutdown: Signal,
    rate_limiter: RateLimiter,
    state: SessionState,
}

impl<R> ConnectionSession<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(
        reader: R,
        outbound: Outbound,
        room: RoomHandle,
        config: Arc<SessionConfig>,
        shutdown: Signal,
    ) -> Self {
        let codec = InboundCodec::new(config.max_line_bytes);
        let rate_limiter = RateLimiter::new(config.rate_limit, config.rate_window());
        Self {
            id: SessionId::new(),
            lines: FramedRead::new(reader, codec),
            outbound,
            room,
            config,
            shutdown,
            rate_limiter,
            state: SessionState::NegotiatingNickname,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Run both protocol states
    pub async fn run(&mut self) -> Result<(), AppError> {
        self.outbound
            .send_lines(&format!("{}\n", render::title(self.room.name())))
            .await?;

        let Some(nickname) = self.negotiate().await? else {
            debug!("Session {} left during nickname negotiation", self.id);
            return Ok(());
        };

        if !self.join(nickname.clone()).await? {
            return Ok(());
        }

        self.active_loop(nickname).await
    }

    /// `NegotiatingNickname`: prompt until a nickname is valid and reserved
    ///
    /// Returns `None` if the connection ends first.
    async fn negotiate(&mut self) -> Result<Option<Nickname>, AppError> {
        loop {
            self.outbound.write_raw(render::NICKNAME_PROMPT).await?;

            let line = match self.next_line().await? {
                Some(Inbound::Line(line)) => line,
                Some(Inbound::Oversized) => {
                    let max = self.config.max_nickname_len;
                    let reason = AppError::NicknameTooLong { max };
                    self.outbound.send_lines(&reason.to_string()).await?;
                    continue;
                }
                None => return Ok(None),
            };

            let nickname = match Nickname::parse_bounded(
                line.trim(),
                self.config.min_nickname_len,
                self.config.max_nickname_len,
            ) {
                Ok(nickname) => nickname,
                Err(e) => {
                    self.outbound.send_lines(&e.to_string()).await?;
                    continue;
                }
            };

            if self.room.reserve_nickname(&nickname).await {
                debug!("Session {} reserved '{}'", self.id, nickname);
                return Ok(Some(nickname));
            }

            // A closing room refuses every reservation
            if self.room.is_closing() || self.shutdown.is_fired() {
                debug!("Session {} negotiation ended by shutdown", self.id);
                return Ok(None);
            }
            let taken = AppError::NicknameTaken(nickname.to_string());
            self.outbound.send_lines(&taken.to_string()).await?;
        }
    }

    /// Ask the room to admit the reserved nickname
    ///
    /// Returns false if the session should end without becoming active.
    async fn join(&mut self, nickname: Nickname) -> Result<bool, AppError> {
        let member = Member::new(self.id, nickname.clone(), self.outbound.clone());

        let history = match self.room.admit(member).await {
            Ok(history) => history,
            Err(AppError::RoomFull) => {
                info!("Session {} rejected: room full", self.id);
                self.outbound.send_notice(&AppError::RoomFull.notice()).await?;
                return Ok(false);
            }
            Err(AppError::RoomClosed) => return Ok(false),
            Err(e) => {
                self.room.release_nickname(&nickname).await;
                return Err(e);
            }
        };

        self.state = SessionState::Active(nickname.clone());
        self.send_welcome(&nickname, &history).await?;
        Ok(true)
    }

    /// Welcome and history replay go out as one write, so live
    /// deliveries can only land before or after the block
    async fn send_welcome(
        &self,
        nickname: &Nickname,
        history: &[ChatMessage],
    ) -> Result<(), AppError> {
        let mut block = render::welcome(self.room.name(), nickname);
        if !history.is_empty() {
            block.push_str("\n\n");
            block.push_str(&render::history(history));
        }
        block.push('\n');
        self.outbound.send_lines(&block).await?;
        Ok(())
    }

    /// `Active`: one line at a time until quit or disconnect
    async fn active_loop(&mut self, nickname: Nickname) -> Result<(), AppError> {
        loop {
            self.outbound.write_raw(render::INPUT_PROMPT).await?;

            let line = match self.next_line().await? {
                Some(Inbound::Line(line)) => line,
                Some(Inbound::Oversized) => {
                    let max = self.config.max_message_len;
                    let notice = AppError::MessageTooLong { max }.notice();
                    self.outbound.send_notice(&notice).await?;
                    continue;
                }
                None => return Ok(()),
            };

            match self.handle_line(&nickname, line.trim()).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Quit) => return Ok(()),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => self.outbound.send_notice(&e.notice()).await?,
            }
        }
    }

    /// Validate and act on one trimmed input line
    ///
    /// Length is checked before the rate limiter, so oversized lines never
    /// use up a slot. `/quit` is never rate limited.
    pub async fn handle_line(&mut self, nickname: &Nickname, line: &str) -> Result<Flow, AppError> {
        if line.is_empty() {
            return Ok(Flow::Continue);
        }

        let max = self.config.max_message_len;
        if line.chars().count() > max {
            return Err(AppError::MessageTooLong { max });
        }

        if !Command::is_quit(line) {
            if let Err(retry_after) = self.rate_limiter.check() {
                debug!(
                    "Session {} rate limited ({} attempts in window)",
                    self.id,
                    self.rate_limiter.recent()
                );
                return Err(AppError::RateLimited {
                    limit: self.rate_limiter.limit(),
                    window: self.rate_limiter.window(),
                    retry_after,
                });
            }
        }

        if line.starts_with('/') {
            let command = Command::parse(line)?;
            return self.dispatch(nickname, command).await;
        }

        self.room.broadcast(ChatMessage::user(nickname, line)).await;
        Ok(Flow::Continue)
    }

    async fn dispatch(&mut self, nickname: &Nickname, command: Command) -> Result<Flow, AppError> {
        trace!("Session {} command {:?}", self.id, command);
        match command {
            Command::Who => {
                let members = self.room.list_members().await;
                let list = render::user_list(self.room.name(), &members, self.room.max_members());
                self.outbound.send_lines(&list).await?;
            }
            Command::Me(action) => {
                self.room.broadcast(ChatMessage::action(nickname, action)).await;
            }
            Command::Help => {
                self.outbound.send_lines(&render::help()).await?;
            }
            Command::Quit => {
                self.outbound.send_notice(render::FAREWELL).await?;
                return Ok(Flow::Quit);
            }
            Command::Unknown(keyword) => {
                return Err(AppError::UnknownCommand(keyword));
            }
        }
        Ok(Flow::Continue)
    }

    /// Read the next frame, waking up periodically
    ///
    /// A read timeout is only a liveness tick and the read is retried.
    /// Shutdown abandons the read. `None` means the session should end.
    async fn next_line(&mut self) -> Result<Option<Inbound>, AppError> {
        loop {
            tokio::select! {
                _ = self.shutdown.fired() => {
                    debug!("Session {} cancelled", self.id);
                    return Ok(None);
                }
                read = tokio::time::timeout(self.config.read_timeout(), self.lines.next()) => {
                    match read {
                        Err(_) => {
                            trace!("Session {} read timeout, retrying", self.id);
                            continue;
                        }
                        Ok(None) => return Ok(None),
                        Ok(Some(Ok(frame))) => return Ok(Some(frame)),
                        Ok(Some(Err(e))) => return Err(e.into()),
                    }
                }
            }
        }
    }

    /// Leave the room (if admitted) and close the connection
    ///
    /// Safe to call more than once.
    pub async fn terminate(&mut self) {
        let state = std::mem::replace(&mut self.state, SessionState::Closed);
        if let SessionState::Active(nickname) = state {
            self.room.remove(&nickname).await;
        }
        self.outbound.close().await;
    }
}
