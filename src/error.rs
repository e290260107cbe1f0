//! Error types for the matchmaking server
//!
//! Defines application-level errors and message send errors.
//! Uses thiserror for ergonomic error definitions.
//!
//! Benign statuses (already searching, already paired, empty pool) are not
//! errors; they are expressed as result enums or `Option` at the call site.
//! Pairing races are resolved by retry inside the matchmaker and never
//! surface here.

use thiserror::Error;

/// Application-level errors
///
/// Covers both fatal errors (connection termination) and
/// business errors (send error message to client).
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Message or typing operation against an ended room, an unknown room,
    /// or a room the user is not a member of
    #[error("Room is not active")]
    RoomNotActive,

    /// Operation attempted without an attached session
    #[error("Not authenticated")]
    NotAuthenticated,
}

/// Message send errors
///
/// Occurs when attempting to send messages through closed channels.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}
