//! Telnet Chat Server Library
//!
//! A single-room, line-oriented chat server for plain TCP clients such as
//! `telnet` or `nc`, using the Actor pattern for room state.
//!
//! # Features
//! - Nickname negotiation with reservation before admission
//! - Bounded room capacity
//! - Chat messages, `/me` actions, `/who`, `/help` and `/quit`
//! - Per-connection sliding-window rate limiting
//! - Optional history replay for newcomers
//! - Orderly shutdown that drains in-flight deliveries
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - The room actor owns membership, reservations and history
//! - Each connection runs a `ConnectionSession` that talks to the room
//!   through a cloneable `RoomHandle`
//! - Broadcast fan-out runs in detached delivery tasks, so a slow client
//!   never blocks the room
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use telnet_chat::{ChatServer, Config};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:2323").await.unwrap();
//!     let server = ChatServer::new(Config::default());
//!     server.serve(listener).await.unwrap();
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod history;
pub mod message;
pub mod rate_limit;
pub mod registry;
pub mod render;
pub mod room;
pub mod server;
pub mod signal;
pub mod types;

// Re-export main types for convenience
pub use client::{Member, Outbound};
pub use codec::{Inbound, InboundCodec};
pub use config::{Config, RoomConfig, SessionConfig};
pub use error::{AppError, ErrorKind, SendError};
pub use handler::{handle_connection, ConnectionSession};
pub use history::HistoryBuffer;
pub use message::{ChatMessage, Command, MessageKind};
pub use rate_limit::RateLimiter;
pub use registry::{NicknameRegistry, NicknameState};
pub use room::{RemoveOutcome, RoomHandle};
pub use server::{ChatServer, ServerHandle};
pub use types::{Nickname, SessionId};
