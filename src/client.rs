//! Client struct definition
//!
//! Represents a connected client with their anonymous profile, outbound
//! message channel, room-subscription forwarding task and last known
//! partner (the target of a report).

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::{Profile, UserId};

/// Connected client information
#[derive(Debug)]
pub struct Client {
    /// Unique identifier for this client
    pub id: UserId,
    /// Anonymous profile (nickname + avatar glyph)
    pub profile: Profile,
    /// Server → Client message channel
    pub sender: mpsc::Sender<ServerMessage>,
    /// Task forwarding the current room's events to this client
    room_task: Option<JoinHandle<()>>,
    /// Most recent partner; reports are filed against them
    pub last_partner: Option<UserId>,
}

impl Client {
    /// Create a new client with a fresh anonymous profile
    pub fn new(id: UserId, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id,
            profile: Profile::anonymous(),
            sender,
            room_task: None,
            last_partner: None,
        }
    }

    /// Send a message to this client
    ///
    /// Returns an error if the channel is closed (client disconnected).
    pub async fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Get the display name for this client
    pub fn display_name(&self) -> &str {
        self.profile.display_name()
    }

    /// Set the client's nickname
    pub fn set_nickname(&mut self, nickname: String) {
        self.profile.nickname = Some(nickname);
    }

    /// Install the forwarding task for a newly matched room
    ///
    /// A previous room's task, if still running, is aborted first.
    pub fn set_room_task(&mut self, task: JoinHandle<()>) {
        if let Some(old) = self.room_task.replace(task) {
            old.abort();
        }
    }

    /// Abort any running room forwarding task
    pub fn clear_room_task(&mut self) {
        if let Some(task) = self.room_task.take() {
            task.abort();
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.clear_room_task();
    }
}
