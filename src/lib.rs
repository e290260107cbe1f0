//! Anonymous Random 1:1 Chat Server Library
//!
//! A matchmaking and session-messaging engine for an anonymous random-chat
//! service, served over WebSocket with tokio-tungstenite.
//!
//! # Features
//! - Waiting pool with FIFO fairness (oldest searcher pairs first)
//! - Race-free pairing: candidate selection, pool removal and room creation
//!   close the classic delete-then-check race
//! - Room lifecycle (active → ended) with at-most-one-active-room per user
//! - Ordered per-room chat with history backfill on subscribe
//! - Ephemeral typing indicators with quiet-period auto-clear
//! - Profanity filtering before any message is stored
//! - Bounded search (poll every 2s, give up after 30s, both configurable)
//! - Partner reporting
//!
//! # Architecture
//! The engine components (`WaitingPool`, `Matchmaker`, `RoomRegistry`,
//! `SessionMessenger`, `SessionController`) are transport-agnostic and
//! internally lock-guarded, so they stay correct under concurrent callers.
//! On top of them sits the Actor pattern with `mpsc` channels:
//! - `MatchServer` is the central actor owning the connected-client table
//! - Each connection has a `handler` task communicating with the server
//!   over `mpsc` channels
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use tokio::sync::mpsc;
//! use roulette_chat::{handle_connection, EngineConfig, MatchServer};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let (cmd_tx, cmd_rx) = mpsc::channel(256);
//!
//!     let server = MatchServer::new(cmd_rx, cmd_tx.clone(), EngineConfig::from_env());
//!     tokio::spawn(server.run());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         let cmd_tx = cmd_tx.clone();
//!         tokio::spawn(handle_connection(stream, cmd_tx));
//!     }
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod filter;
pub mod handler;
pub mod message;
pub mod messenger;
pub mod pairing;
pub mod pool;
pub mod reports;
pub mod rooms;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use client::Client;
pub use config::EngineConfig;
pub use error::{AppError, SendError};
pub use filter::ProfanityFilter;
pub use handler::handle_connection;
pub use message::{ClientMessage, ErrorCode, ServerMessage};
pub use messenger::SessionMessenger;
pub use pairing::Matchmaker;
pub use pool::WaitingPool;
pub use reports::{Report, ReportLog};
pub use rooms::{CreateRoomError, Message, RoomEvent, RoomHandle, RoomRegistry};
pub use server::{MatchServer, ServerCommand};
pub use session::{SearchStart, SessionController, SessionEvent, SessionStatus};
pub use types::{MessageId, Profile, RoomId, UserId};
