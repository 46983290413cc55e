//! ChatServer implementation
//!
//! Accepts TCP connections, runs one session task per connection against
//! the shared room, and coordinates shutdown: cancel sessions, wait for
//! them, then stop the room.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::{Config, SessionConfig};
use crate::error::AppError;
use crate::handler::handle_connection;
use crate::room::RoomHandle;
use crate::signal::{self, Signal, Trigger};

/// Pause after a failed accept so a persistent error does not spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// The chat server
///
/// Owns the room for its whole lifetime. Use `handle()` before `serve()`
/// to keep a way of shutting it down.
pub struct ChatServer {
    config: Config,
    room: RoomHandle,
    session_config: Arc<SessionConfig>,
    shutdown: Arc<Trigger>,
    done: Trigger,
    finished: Signal,
}

impl ChatServer {
    /// Create the server and spawn its room
    pub fn new(config: Config) -> Self {
        let room = RoomHandle::spawn(config.room.clone());
        let session_config = Arc::new(config.session.clone());
        let (shutdown, _) = signal::channel();
        let (done, finished) = signal::channel();

        Self {
            config,
            room,
            session_config,
            shutdown: Arc::new(shutdown),
            done,
            finished,
        }
    }

    pub fn room(&self) -> &RoomHandle {
        &self.room
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: Arc::clone(&self.shutdown),
            finished: self.finished.clone(),
        }
    }

    /// Accept connections until shutdown, then tear everything down
    pub async fn serve(self, listener: TcpListener) -> Result<(), AppError> {
        let addr = listener.local_addr()?;
        info!(
            "Server started on {} (room: {}, max users: {})",
            addr, self.config.room.name, self.config.room.max_members
        );

        let mut sessions = JoinSet::new();
        let mut shutdown = self.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = shutdown.fired() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!("New connection from {}", peer);
                        let room = self.room.clone();
                        let config = Arc::clone(&self.session_config);
                        let cancel = self.shutdown.subscribe();

                        sessions.spawn(async move {
                            if let Err(e) = handle_connection(stream, room, config, cancel).await {
                                warn!("Connection from {} ended with error: {}", peer, e);
                            }
                            debug!("Connection from {} closed", peer);
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(result) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = result {
                        error!("Session task failed: {}", e);
                    }
                }
            }
        }

        drop(listener);
        self.finish(sessions).await;
        Ok(())
    }

    async fn finish(self, mut sessions: JoinSet<()>) {
        info!("Stopping chat server...");
        let budget = self.config.shutdown_budget();

        let waited = tokio::time::timeout(budget, async {
            while sessions.join_next().await.is_some() {}
        })
        .await;
        if waited.is_err() {
            warn!(
                "{} sessions still running after {:?}, aborting",
                sessions.len(),
                budget
            );
            sessions.abort_all();
        }

        let _ = tokio::time::timeout(budget, self.room.stop()).await;
        if !self.room.is_stopped() {
            warn!("Room did not stop within {:?}", budget);
        }

        info!("Chat server stopped");
        self.done.fire();
    }
}

/// Cloneable shutdown control for a running `ChatServer`
#[derive(Debug, Clone)]
pub struct ServerHandle {
    shutdown: Arc<Trigger>,
    finished: Signal,
}

impl ServerHandle {
    /// Signal shutdown and wait until the server has fully stopped
    pub async fn shutdown(&self) {
        self.shutdown.fire();
        self.finished.clone().fired().await;
    }
}
