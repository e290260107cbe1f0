//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake,
//! message parsing, and bidirectional communication with the MatchServer.
//! Disconnection always reaches the actor, which releases the user's pool
//! entry, room and session state.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::message::{ClientMessage, ServerMessage};
use crate::server::ServerCommand;
use crate::types::UserId;

/// Handle a new TCP connection
///
/// Performs WebSocket handshake, issues an anonymous identity, sets up
/// bidirectional communication, and manages the connection lifecycle.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<ServerCommand>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Issue an anonymous user ID for this connection
    let user_id = UserId::new();
    info!("Client {} connected from {}", user_id, peer_addr);

    // Create channel for server -> client messages
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(32);

    // Register with MatchServer; the actor replies with Connected
    if cmd_tx
        .send(ServerCommand::Connect {
            user_id,
            sender: msg_tx,
        })
        .await
        .is_err()
    {
        error!("Failed to register client {} - server closed", user_id);
        return Err(AppError::ChannelSend);
    }

    // Clone cmd_tx for read task
    let cmd_tx_read = cmd_tx.clone();

    // Spawn read task (WebSocket -> ServerCommand)
    let read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(client_msg) => {
                            let cmd = client_message_to_command(user_id, client_msg);
                            if cmd_tx_read.send(cmd).await.is_err() {
                                debug!("Server closed, ending read task for {}", user_id);
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Invalid JSON from {}: {}", user_id, e);
                            // The server treats unparseable input as a no-op;
                            // the write side stays usable.
                        }
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("Client {} sent close frame", user_id);
                    break;
                }
                Ok(Message::Ping(data)) => {
                    debug!("Ping from {}", user_id);
                    // Pong is handled automatically by tungstenite
                    let _ = data; // Suppress unused warning
                }
                Ok(Message::Pong(_)) => {
                    debug!("Pong from {}", user_id);
                }
                Ok(_) => {
                    // Binary or other message types - ignore
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", user_id, e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", user_id);
    });

    // Spawn write task (ServerMessage -> WebSocket)
    let write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    // Continue - don't break on serialization errors
                }
            }
        }
        debug!("Write task ended for client");

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    // Wait for either task to complete
    tokio::select! {
        _ = read_task => {
            debug!("Read task completed for {}", user_id);
        }
        _ = write_task => {
            debug!("Write task completed for {}", user_id);
        }
    }

    // Send disconnect command; the actor tears down session state
    let _ = cmd_tx.send(ServerCommand::Disconnect { user_id }).await;

    info!("Client {} disconnected", user_id);

    Ok(())
}

/// Convert a ClientMessage to a ServerCommand
fn client_message_to_command(user_id: UserId, msg: ClientMessage) -> ServerCommand {
    match msg {
        ClientMessage::SetNickname { nickname } => ServerCommand::SetNickname { user_id, nickname },
        ClientMessage::StartSearch => ServerCommand::StartSearch { user_id },
        ClientMessage::NextChat => ServerCommand::NextChat { user_id },
        ClientMessage::LeaveChat => ServerCommand::LeaveChat { user_id },
        ClientMessage::Chat { content } => ServerCommand::Chat { user_id, content },
        ClientMessage::Typing => ServerCommand::Typing {
            user_id,
            typing: true,
        },
        ClientMessage::StopTyping => ServerCommand::Typing {
            user_id,
            typing: false,
        },
        ClientMessage::Report { reason } => ServerCommand::Report { user_id, reason },
    }
}
