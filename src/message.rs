//! Wire protocol definitions
//!
//! JSON-based bidirectional message protocol using Serde's tagged enum
//! for type-safe serialization/deserialization.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Client → Server message
///
/// All messages from client to server. Uses tagged enum with snake_case naming.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Set display nickname (optional; matchmaking works without it)
    SetNickname { nickname: String },
    /// Enter the waiting pool and search for a partner
    StartSearch,
    /// End the current room and immediately search again
    NextChat,
    /// Leave the current room or cancel an ongoing search
    LeaveChat,
    /// Send a chat message to the current room
    Chat { content: String },
    /// Indicate typing started
    Typing,
    /// Indicate typing stopped
    StopTyping,
    /// Report the current (or most recent) partner
    Report { reason: String },
}

/// Server → Client message
///
/// All messages from server to client. Uses tagged enum with snake_case naming.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection successful, anonymous identity issued
    Connected {
        user_id: String,
        avatar_glyph: String,
    },
    /// Nickname set successfully
    NicknameSet { nickname: String },
    /// Searching for a partner (also the ack for a redundant request)
    Searching,
    /// No partner found within the search bound
    SearchTimeout,
    /// Paired with a partner
    Matched {
        room_id: String,
        partner_nickname: Option<String>,
        partner_avatar: String,
    },
    /// Chat message from the partner
    Chat { from: String, content: String },
    /// Partner is typing
    PartnerTyping,
    /// Partner stopped typing
    PartnerStopTyping,
    /// The room ended (partner left or moved on); not an error
    RoomEnded,
    /// Left the room / search cancelled
    Left,
    /// Report recorded
    ReportFiled,
    /// Error occurred
    Error { code: ErrorCode, message: String },
}

/// Error codes for ServerMessage::Error
///
/// Represents different error scenarios that can be communicated to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Message or typing op against an ended or foreign room
    RoomNotActive,
    /// Operation attempted without a valid session
    NotAuthenticated,
    /// Invalid message format or unusable request
    InvalidMessage,
}

/// Convert AppError to ServerMessage for client notification
impl From<AppError> for ServerMessage {
    fn from(err: AppError) -> Self {
        let (code, message) = match &err {
            AppError::RoomNotActive => (
                ErrorCode::RoomNotActive,
                "You are not in an active chat".to_string(),
            ),
            AppError::NotAuthenticated => (
                ErrorCode::NotAuthenticated,
                "Session is not authenticated".to_string(),
            ),
            AppError::Json(e) => (
                ErrorCode::InvalidMessage,
                format!("Invalid message format: {}", e),
            ),
            // Fatal errors are not typically converted (connection closes)
            _ => (ErrorCode::InvalidMessage, "Internal error".to_string()),
        };
        ServerMessage::Error { code, message }
    }
}
