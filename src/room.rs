//! RoomActor implementation
//!
//! The single owner of membership and history. Sessions talk to it through
//! a cloneable `RoomHandle`; every mutation is a `RoomCommand` processed to
//! completion, one at a time, by the control loop. That gives admit,
//! remove and broadcast a single total order and keeps the registry free
//! of locks.
//!
//! Network writes happen in detached delivery tasks, so a slow member
//! never holds up the loop or other members. Cross-member delivery order
//! is not guaranteed.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::client::Member;
use crate::config::RoomConfig;
use crate::error::AppError;
use crate::history::HistoryBuffer;
use crate::message::ChatMessage;
use crate::registry::NicknameRegistry;
use crate::signal::{self, Signal, Trigger};
use crate::types::Nickname;

/// Commands sent from sessions to the RoomActor
#[derive(Debug)]
pub enum RoomCommand {
    /// Hold a nickname during negotiation
    Reserve {
        nickname: Nickname,
        respond_to: oneshot::Sender<bool>,
    },
    /// Give up a reservation
    Release { nickname: Nickname },
    /// Occupy a nickname with a live member
    ///
    /// Replies with the history as it stood just before the member joined.
    Admit {
        member: Member,
        respond_to: oneshot::Sender<Result<Vec<ChatMessage>, AppError>>,
    },
    /// Drop an admitted member
    Remove {
        nickname: Nickname,
        respond_to: oneshot::Sender<RemoveOutcome>,
    },
    /// Record and fan out a message
    Broadcast { message: ChatMessage },
    /// Snapshot of occupied nicknames
    ListMembers {
        respond_to: oneshot::Sender<Vec<Nickname>>,
    },
    /// Copy of the history buffer
    History {
        respond_to: oneshot::Sender<Vec<ChatMessage>>,
    },
}

/// Result of a removal request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
}

/// The room control loop
///
/// Owns the registry, the history buffer and every in-flight delivery.
pub struct RoomActor {
    config: Arc<RoomConfig>,
    registry: NicknameRegistry,
    history: Option<HistoryBuffer>,
    deliveries: JoinSet<()>,
    receiver: mpsc::Receiver<RoomCommand>,
    shutdown: Signal,
    /// Fired (or dropped) once the loop has fully exited
    done: Trigger,
    /// Set while draining after stop; new admissions are refused
    closing: bool,
}

impl RoomActor {
    pub fn new(
        config: Arc<RoomConfig>,
        receiver: mpsc::Receiver<RoomCommand>,
        shutdown: Signal,
        done: Trigger,
    ) -> Self {
        let history = config
            .history_enabled
            .then(|| HistoryBuffer::new(config.history_size));
        Self {
            config,
            registry: NicknameRegistry::new(),
            history,
            deliveries: JoinSet::new(),
            receiver,
            shutdown,
            done,
            closing: false,
        }
    }

    /// Run the control loop until stopped or every handle is dropped
    pub async fn run(mut self) {
        info!(
            "Room '{}' started (max members: {}, history: {})",
            self.config.name,
            self.config.max_members,
            self.history.as_ref().map_or(0, HistoryBuffer::capacity)
        );

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.fired() => {
                    debug!("Room '{}' received stop signal", self.config.name);
                    break;
                }
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                Some(result) = self.deliveries.join_next(), if !self.deliveries.is_empty() => {
                    log_delivery(result);
                }
            }
        }

        self.drain().await;
        info!("Room '{}' stopped", self.config.name);
        self.done.fire();
    }

    /// Finish queued commands and outstanding deliveries
    async fn drain(&mut self) {
        self.closing = true;
        self.receiver.close();
        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        let pending = self.deliveries.len();
        if pending > 0 {
            debug!("Waiting for {} deliveries", pending);
        }
        let budget = self.config.drain_timeout();
        let deliveries = &mut self.deliveries;
        let drained = tokio::time::timeout(budget, async {
            while let Some(result) = deliveries.join_next().await {
                log_delivery(result);
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                "Abandoning {} deliveries after {:?}",
                self.deliveries.len(),
                budget
            );
            self.deliveries.abort_all();
        }

        let reserved = self.registry.reserved_count();
        if reserved > 0 {
            debug!("Dropping {} outstanding reservations", reserved);
        }
        self.registry.clear();
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Reserve {
                nickname,
                respond_to,
            } => {
                let reserved = !self.closing && self.registry.reserve(&nickname);
                debug!("Reserve '{}': {}", nickname, reserved);
                let _ = respond_to.send(reserved);
            }
            RoomCommand::Release { nickname } => {
                if self.registry.release(&nickname) {
                    debug!("Released reservation '{}'", nickname);
                }
            }
            RoomCommand::Admit { member, respond_to } => {
                self.handle_admit(member, respond_to);
            }
            RoomCommand::Remove {
                nickname,
                respond_to,
            } => {
                let outcome = self.handle_remove(&nickname);
                let _ = respond_to.send(outcome);
            }
            RoomCommand::Broadcast { message } => {
                self.broadcast(message);
            }
            RoomCommand::ListMembers { respond_to } => {
                let _ = respond_to.send(self.registry.occupied_names());
            }
            RoomCommand::History { respond_to } => {
                let _ = respond_to.send(self.history_snapshot());
            }
        }
    }

    /// Handle member admission
    ///
    /// "Room full" is decided here, against the members present when the
    /// command is processed, so racing joins resolve in submission order.
    fn handle_admit(
        &mut self,
        member: Member,
        respond_to: oneshot::Sender<Result<Vec<ChatMessage>, AppError>>,
    ) {
        if self.closing {
            let _ = respond_to.send(Err(AppError::RoomClosed));
            return;
        }

        let nickname = member.nickname.clone();
        let session_id = member.session_id;
        debug!(
            "Admitting '{}' ({}) from {:?}",
            nickname,
            session_id,
            self.registry.state(&nickname)
        );

        if let Err(e) = self.registry.occupy(member, self.config.max_members) {
            info!("Admission of '{}' ({}) rejected: {}", nickname, session_id, e);
            let _ = respond_to.send(Err(e));
            return;
        }

        let history = self.history_snapshot();
        if respond_to.send(Ok(history)).is_err() {
            // Session gave up while waiting; undo so the name is not stranded
            debug!("Session {} went away during admission", session_id);
            self.registry.vacate(&nickname);
            return;
        }

        info!(
            "'{}' ({}) joined ({}/{})",
            nickname,
            session_id,
            self.registry.occupied_count(),
            self.config.max_members
        );
        self.broadcast(ChatMessage::system(format!(
            "{} has joined the room",
            nickname
        )));
    }

    /// Handle member departure. Idempotent.
    fn handle_remove(&mut self, nickname: &Nickname) -> RemoveOutcome {
        let Some(member) = self.registry.vacate(nickname) else {
            return RemoveOutcome::NotFound;
        };

        info!(
            "'{}' ({}) left ({}/{})",
            nickname,
            member.session_id,
            self.registry.occupied_count(),
            self.config.max_members
        );
        self.broadcast(ChatMessage::system(format!(
            "{} has left the room",
            nickname
        )));
        RemoveOutcome::Removed
    }

    /// Record a message and schedule delivery to every current member
    ///
    /// The recipient list is fixed here; the writes happen in detached
    /// tasks.
    fn broadcast(&mut self, message: ChatMessage) {
        if let Some(history) = self.history.as_mut() {
            history.push(message.clone());
        }

        let message = Arc::new(message);
        let mut recipients = 0;
        for member in self.registry.members() {
            let member = member.clone();
            let message = Arc::clone(&message);
            self.deliveries.spawn(async move {
                member.deliver(&message).await;
            });
            recipients += 1;
        }
        debug!("Broadcast from '{}' to {} members", message.from, recipients);
    }

    fn history_snapshot(&self) -> Vec<ChatMessage> {
        self.history
            .as_ref()
            .map(HistoryBuffer::snapshot)
            .unwrap_or_default()
    }
}

fn log_delivery(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!("Delivery task panicked: {}", e);
        }
    }
}

/// Handle to communicate with the RoomActor
///
/// Every method is a no-op (or returns an empty/negative answer) once the
/// room has stopped; none of them block on a stopped room.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    config: Arc<RoomConfig>,
    commands: mpsc::Sender<RoomCommand>,
    stop: Arc<Trigger>,
    stopped: Signal,
}

impl RoomHandle {
    /// Spawn the RoomActor and return a handle to it
    pub fn spawn(config: RoomConfig) -> Self {
        let config = Arc::new(config);
        let (commands, receiver) = mpsc::channel(config.command_buffer);
        let (stop, shutdown) = signal::channel();
        let (done, stopped) = signal::channel();

        let actor = RoomActor::new(Arc::clone(&config), receiver, shutdown, done);
        tokio::spawn(actor.run());

        Self {
            config,
            commands,
            stop: Arc::new(stop),
            stopped,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn max_members(&self) -> usize {
        self.config.max_members
    }

    /// Atomically reserve a nickname that is wholly absent
    pub async fn reserve_nickname(&self, nickname: &Nickname) -> bool {
        self.request(|respond_to| RoomCommand::Reserve {
            nickname: nickname.clone(),
            respond_to,
        })
        .await
        .unwrap_or(false)
    }

    /// Release a reservation; occupied nicknames are unaffected
    pub async fn release_nickname(&self, nickname: &Nickname) {
        self.submit(RoomCommand::Release {
            nickname: nickname.clone(),
        })
        .await;
    }

    /// Admit a member
    ///
    /// On success returns the history replay for the new member. Fails
    /// with `RoomFull`, `NicknameTaken` or, after stop, `RoomClosed`.
    pub async fn admit(&self, member: Member) -> Result<Vec<ChatMessage>, AppError> {
        self.request(|respond_to| RoomCommand::Admit { member, respond_to })
            .await
            .unwrap_or(Err(AppError::RoomClosed))
    }

    /// Remove a member
    pub async fn remove(&self, nickname: &Nickname) -> RemoveOutcome {
        self.request(|respond_to| RoomCommand::Remove {
            nickname: nickname.clone(),
            respond_to,
        })
        .await
        .unwrap_or(RemoveOutcome::NotFound)
    }

    /// Submit a message to the room's total order
    pub async fn broadcast(&self, message: ChatMessage) {
        self.submit(RoomCommand::Broadcast { message }).await;
    }

    /// Occupied nicknames, sorted
    pub async fn list_members(&self) -> Vec<Nickname> {
        self.request(|respond_to| RoomCommand::ListMembers { respond_to })
            .await
            .unwrap_or_default()
    }

    /// Copy of the history buffer, oldest first
    pub async fn history(&self) -> Vec<ChatMessage> {
        self.request(|respond_to| RoomCommand::History { respond_to })
            .await
            .unwrap_or_default()
    }

    /// Stop the room and wait for the control loop to exit
    pub async fn stop(&self) {
        self.stop.fire();
        self.stopped.clone().fired().await;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.is_fired()
    }

    /// True from the moment stop is requested, before the drain finishes
    pub fn is_closing(&self) -> bool {
        self.stop.is_fired() || self.stopped.is_fired()
    }

    async fn submit(&self, cmd: RoomCommand) {
        if self.commands.send(cmd).await.is_err() {
            debug!("Room '{}' is closed, dropping command", self.config.name);
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Option<T> {
        let (respond_to, response) = oneshot::channel();
        if self.commands.send(build(respond_to)).await.is_err() {
            debug!("Room '{}' is closed, dropping request", self.config.name);
            return None;
        }
        response.await.ok()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream, Lines};

    use super::*;
    use crate::client::Outbound;
    use crate::types::SessionId;

    const WAIT: Duration = Duration::from_secs(2);

    fn room(max_members: usize, history_size: Option<usize>) -> RoomHandle {
        RoomHandle::spawn(RoomConfig {
            name: "Test Room".to_string(),
            max_members,
            history_enabled: history_size.is_some(),
            history_size: history_size.unwrap_or(50),
            ..RoomConfig::default()
        })
    }

    fn nick(name: &str) -> Nickname {
        Nickname::parse(name).unwrap()
    }

    fn member(name: &str) -> (Member, Lines<BufReader<DuplexStream>>) {
        let (local, remote) = tokio::io::duplex(4096);
        let member = Member::new(
            SessionId::new(),
            nick(name),
            Outbound::new(local, Duration::from_secs(5)),
        );
        (member, BufReader::new(remote).lines())
    }

    async fn expect_line(lines: &mut Lines<BufReader<DuplexStream>>, needle: &str) {
        loop {
            let line = tokio::time::timeout(WAIT, lines.next_line())
                .await
                .expect("timed out waiting for line")
                .unwrap()
                .expect("stream ended");
            if line.contains(needle) {
                return;
            }
        }
    }

    #[tokio::test]
    async fn test_concurrent_reservation_single_winner() {
        let room = room(10, None);
        let mut tasks = JoinSet::new();
        for _ in 0..20 {
            let room = room.clone();
            tasks.spawn(async move { room.reserve_nickname(&nick("alice")).await });
        }

        let mut winners = 0;
        while let Some(result) = tasks.join_next().await {
            if result.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        room.stop().await;
    }

    #[tokio::test]
    async fn test_release_only_frees_reservation() {
        let room = room(10, None);
        assert!(room.reserve_nickname(&nick("alice")).await);
        room.release_nickname(&nick("alice")).await;
        assert!(room.reserve_nickname(&nick("alice")).await);

        let (alice, _rx) = member("alice");
        room.admit(alice).await.unwrap();
        room.release_nickname(&nick("alice")).await;
        assert!(!room.reserve_nickname(&nick("alice")).await);
        assert_eq!(room.list_members().await, vec![nick("alice")]);
        room.stop().await;
    }

    #[tokio::test]
    async fn test_capacity_rejects_and_releases() {
        let room = room(2, None);
        for name in ["alice", "bob"] {
            assert!(room.reserve_nickname(&nick(name)).await);
            let (m, _rx) = member(name);
            room.admit(m).await.unwrap();
        }

        assert!(room.reserve_nickname(&nick("carol")).await);
        let (carol, _rx) = member("carol");
        assert!(matches!(room.admit(carol).await, Err(AppError::RoomFull)));

        // Rejection released the reservation
        assert!(room.reserve_nickname(&nick("carol")).await);
        assert_eq!(room.list_members().await, vec![nick("alice"), nick("bob")]);
        room.stop().await;
    }

    #[tokio::test]
    async fn test_reservations_do_not_count_toward_capacity() {
        let room = room(1, None);
        assert!(room.reserve_nickname(&nick("waiting")).await);
        let (alice, _rx) = member("alice");
        room.admit(alice).await.unwrap();
        room.stop().await;
    }

    #[tokio::test]
    async fn test_admit_rejects_occupied_nickname() {
        let room = room(10, None);
        let (first, _rx1) = member("alice");
        let (second, _rx2) = member("alice");
        room.admit(first).await.unwrap();
        assert!(matches!(
            room.admit(second).await,
            Err(AppError::NicknameTaken(_))
        ));
        assert_eq!(room.list_members().await.len(), 1);
        room.stop().await;
    }

    #[tokio::test]
    async fn test_history_keeps_newest_in_order() {
        let room = room(10, Some(3));
        let sender = nick("alice");
        for i in 0..10 {
            room.broadcast(ChatMessage::user(&sender, format!("msg {}", i)))
                .await;
        }

        let history = room.history().await;
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["msg 7", "msg 8", "msg 9"]);
        room.stop().await;
    }

    #[tokio::test]
    async fn test_history_disabled() {
        let room = room(10, None);
        room.broadcast(ChatMessage::system("hello")).await;
        assert!(room.history().await.is_empty());
        room.stop().await;
    }

    #[tokio::test]
    async fn test_admit_returns_history_before_join_notice() {
        let room = room(10, Some(10));
        room.broadcast(ChatMessage::system("earlier")).await;

        let (alice, _rx) = member("alice");
        let replay = room.admit(alice).await.unwrap();
        assert_eq!(replay.len(), 1);
        assert_eq!(replay[0].content, "earlier");

        // The join notice went into history afterwards
        let history = room.history().await;
        assert_eq!(history.last().unwrap().content, "alice has joined the room");
        room.stop().await;
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let room = room(10, None);
        let (alice, _rx) = member("alice");
        room.admit(alice).await.unwrap();

        assert_eq!(room.remove(&nick("alice")).await, RemoveOutcome::Removed);
        assert_eq!(room.remove(&nick("alice")).await, RemoveOutcome::NotFound);
        assert!(room.list_members().await.is_empty());
        room.stop().await;
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_members() {
        let room = room(10, None);
        let (alice, mut alice_rx) = member("alice");
        let (bob, mut bob_rx) = member("bob");
        room.admit(alice).await.unwrap();
        room.admit(bob).await.unwrap();

        room.broadcast(ChatMessage::user(&nick("alice"), "hello everyone"))
            .await;

        expect_line(&mut alice_rx, "alice: hello everyone").await;
        expect_line(&mut bob_rx, "alice: hello everyone").await;
        room.stop().await;
    }

    #[tokio::test]
    async fn test_leave_notice_reaches_remaining_members() {
        let room = room(10, None);
        let (alice, _alice_rx) = member("alice");
        let (bob, mut bob_rx) = member("bob");
        room.admit(alice).await.unwrap();
        room.admit(bob).await.unwrap();

        room.remove(&nick("alice")).await;
        expect_line(&mut bob_rx, "[System] alice has left the room").await;
        room.stop().await;
    }

    #[tokio::test]
    async fn test_stalled_member_does_not_block_room() {
        let room = room(10, None);

        // Tiny buffer that nobody reads, with a long write timeout
        let (local, _stalled_remote) = tokio::io::duplex(8);
        let stalled = Member::new(
            SessionId::new(),
            nick("stalled"),
            Outbound::new(local, Duration::from_secs(60)),
        );
        room.admit(stalled).await.unwrap();

        let (bob, mut bob_rx) = member("bob");
        tokio::time::timeout(WAIT, room.admit(bob))
            .await
            .unwrap()
            .unwrap();

        room.broadcast(ChatMessage::system("x".repeat(256))).await;
        expect_line(&mut bob_rx, &"x".repeat(256)).await;

        let (carol, _rx) = member("carol");
        tokio::time::timeout(WAIT, room.admit(carol))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_stop_drains_in_flight_broadcast() {
        let room = room(10, Some(10));
        let mut receivers = Vec::new();
        for name in ["alice", "bob", "carol"] {
            let (m, rx) = member(name);
            room.admit(m).await.unwrap();
            receivers.push(rx);
        }

        room.broadcast(ChatMessage::user(&nick("alice"), "last words"))
            .await;
        room.stop().await;
        assert!(room.is_stopped());

        for rx in receivers.iter_mut() {
            expect_line(rx, "alice: last words").await;
        }
    }

    #[tokio::test]
    async fn test_operations_after_stop_are_noops() {
        let room = room(10, Some(10));
        room.stop().await;

        let (alice, _rx) = member("alice");
        let admitted = tokio::time::timeout(WAIT, room.admit(alice)).await.unwrap();
        assert!(matches!(admitted, Err(AppError::RoomClosed)));

        tokio::time::timeout(WAIT, room.broadcast(ChatMessage::system("late")))
            .await
            .unwrap();
        assert!(!room.reserve_nickname(&nick("bob")).await);
        assert_eq!(room.remove(&nick("alice")).await, RemoveOutcome::NotFound);
        assert!(room.list_members().await.is_empty());
        assert!(room.history().await.is_empty());

        // Stopping twice is fine
        tokio::time::timeout(WAIT, room.stop()).await.unwrap();
    }
}
