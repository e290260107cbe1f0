//! MatchServer Actor implementation
//!
//! The central actor that owns the connected-client table and wires client
//! commands into the matchmaking engine. Uses the Actor pattern with mpsc
//! channels for message passing: handlers push `ServerCommand`s in, the
//! actor routes engine events back out through each client's channel.
//!
//! Matchmaking state itself (waiting pool, rooms) is lock-guarded inside
//! the engine components, so pairing remains correct under concurrent
//! callers; the actor only serializes the connected-client bookkeeping.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::config::EngineConfig;
use crate::error::AppError;
use crate::filter::ProfanityFilter;
use crate::message::{ErrorCode, ServerMessage};
use crate::messenger::SessionMessenger;
use crate::pairing::Matchmaker;
use crate::reports::ReportLog;
use crate::rooms::{RoomEvent, RoomRegistry};
use crate::session::{SearchStart, SessionController, SessionEvent};
use crate::types::{RoomId, UserId};

/// Commands sent from handlers (and internal tasks) to the MatchServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// New client connected
    Connect {
        user_id: UserId,
        sender: mpsc::Sender<ServerMessage>,
    },
    /// Client disconnected
    Disconnect { user_id: UserId },
    /// Set client's nickname
    SetNickname { user_id: UserId, nickname: String },
    /// Enter the waiting pool
    StartSearch { user_id: UserId },
    /// End the current room and search again
    NextChat { user_id: UserId },
    /// Leave the room / cancel the search
    LeaveChat { user_id: UserId },
    /// Send a chat message
    Chat { user_id: UserId, content: String },
    /// Typing indicator update
    Typing { user_id: UserId, typing: bool },
    /// Report the current or most recent partner
    Report { user_id: UserId, reason: String },
    /// Internal: a session event surfaced for a user
    SessionNotice { user_id: UserId, event: SessionEvent },
}

/// The main MatchServer actor
pub struct MatchServer {
    /// All connected clients: UserId -> Client
    clients: HashMap<UserId, Client>,
    /// Per-user session state machines
    sessions: SessionController,
    /// Room messaging and typing
    messenger: Arc<SessionMessenger>,
    /// Room lifecycle and active-room index
    rooms: Arc<RoomRegistry>,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
    /// Command sender handle for internal forwarding tasks
    self_tx: mpsc::Sender<ServerCommand>,
}

impl MatchServer {
    /// Create a server and its engine stack from configuration
    pub fn new(
        receiver: mpsc::Receiver<ServerCommand>,
        self_tx: mpsc::Sender<ServerCommand>,
        config: EngineConfig,
    ) -> Self {
        let rooms = Arc::new(RoomRegistry::new());
        let matchmaker = Arc::new(Matchmaker::new(Arc::clone(&rooms)));
        let filter = Arc::new(ProfanityFilter::new(config.banned_words.iter()));
        let messenger = Arc::new(SessionMessenger::new(
            Arc::clone(&rooms),
            filter,
            config.typing_quiet_period,
        ));
        let reports = Arc::new(ReportLog::new());
        let sessions = SessionController::new(matchmaker, Arc::clone(&rooms), reports, config);

        Self {
            clients: HashMap::new(),
            sessions,
            messenger,
            rooms,
            receiver,
            self_tx,
        }
    }

    /// Run the MatchServer event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!("MatchServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        info!("MatchServer shutting down");
    }

    /// Process a single command
    async fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Connect { user_id, sender } => {
                self.handle_connect(user_id, sender).await;
            }
            ServerCommand::Disconnect { user_id } => {
                self.handle_disconnect(user_id);
            }
            ServerCommand::SetNickname { user_id, nickname } => {
                self.handle_set_nickname(user_id, nickname).await;
            }
            ServerCommand::StartSearch { user_id } => {
                self.handle_start_search(user_id).await;
            }
            ServerCommand::NextChat { user_id } => {
                self.handle_next_chat(user_id).await;
            }
            ServerCommand::LeaveChat { user_id } => {
                self.handle_leave_chat(user_id).await;
            }
            ServerCommand::Chat { user_id, content } => {
                self.handle_chat(user_id, content).await;
            }
            ServerCommand::Typing { user_id, typing } => {
                self.handle_typing(user_id, typing).await;
            }
            ServerCommand::Report { user_id, reason } => {
                self.handle_report(user_id, reason).await;
            }
            ServerCommand::SessionNotice { user_id, event } => {
                self.handle_session_notice(user_id, event).await;
            }
        }
    }

    /// Handle new client connection: issue identity, bind session events
    async fn handle_connect(&mut self, user_id: UserId, sender: mpsc::Sender<ServerMessage>) {
        info!("Client {} connected", user_id);

        let mut session_rx = self.sessions.attach(user_id);
        let self_tx = self.self_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = session_rx.recv().await {
                if self_tx
                    .send(ServerCommand::SessionNotice { user_id, event })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        let client = Client::new(user_id, sender);
        let connected = ServerMessage::Connected {
            user_id: user_id.to_string(),
            avatar_glyph: client.profile.avatar_glyph.clone(),
        };
        let _ = client.send(connected).await;
        self.clients.insert(user_id, client);

        debug!("Total clients: {}", self.clients.len());
    }

    /// Handle client disconnection: tear down session, pool and room state
    fn handle_disconnect(&mut self, user_id: UserId) {
        info!("Client {} disconnected", user_id);
        self.sessions.detach(user_id);
        self.clients.remove(&user_id);
        debug!("Total clients: {}", self.clients.len());
    }

    /// Handle nickname setting
    async fn handle_set_nickname(&mut self, user_id: UserId, nickname: String) {
        let Some(client) = self.clients.get_mut(&user_id) else {
            return;
        };

        client.set_nickname(nickname.clone());
        info!("Client {} set nickname to '{}'", user_id, nickname);

        let _ = client.send(ServerMessage::NicknameSet { nickname }).await;
    }

    /// Handle a search request
    async fn handle_start_search(&mut self, user_id: UserId) {
        let Some(client) = self.clients.get(&user_id) else {
            return;
        };

        match self.sessions.start_search(user_id) {
            Ok(SearchStart::Started) | Ok(SearchStart::AlreadySearching) => {
                let _ = client.send(ServerMessage::Searching).await;
            }
            Ok(SearchStart::AlreadyPaired) => {
                debug!("Client {} requested search while paired", user_id);
            }
            Err(err) => {
                let _ = client.send(err.into()).await;
            }
        }
    }

    /// Handle "next": end the room, search again
    async fn handle_next_chat(&mut self, user_id: UserId) {
        let Some(client) = self.clients.get(&user_id) else {
            return;
        };

        match self.sessions.next(user_id) {
            Ok(_) => {
                let _ = client.send(ServerMessage::Searching).await;
            }
            Err(err) => {
                let _ = client.send(err.into()).await;
            }
        }
    }

    /// Handle voluntary leave
    async fn handle_leave_chat(&mut self, user_id: UserId) {
        let Some(client) = self.clients.get(&user_id) else {
            return;
        };

        match self.sessions.leave(user_id) {
            Ok(()) => {
                let _ = client.send(ServerMessage::Left).await;
            }
            Err(err) => {
                let _ = client.send(err.into()).await;
            }
        }
    }

    /// Handle chat message: post into the user's active room
    async fn handle_chat(&mut self, user_id: UserId, content: String) {
        let Some(client) = self.clients.get(&user_id) else {
            return;
        };

        let Some(room) = self.rooms.active_room_for(user_id) else {
            let _ = client.send(AppError::RoomNotActive.into()).await;
            return;
        };

        if let Err(err) = self.messenger.post_message(room.id, user_id, &content) {
            let _ = client.send(err.into()).await;
        }
    }

    /// Handle typing indicator updates
    async fn handle_typing(&mut self, user_id: UserId, typing: bool) {
        let Some(client) = self.clients.get(&user_id) else {
            return;
        };

        let Some(room) = self.rooms.active_room_for(user_id) else {
            let _ = client.send(AppError::RoomNotActive.into()).await;
            return;
        };

        if let Err(err) = self.messenger.set_typing(room.id, user_id, typing) {
            let _ = client.send(err.into()).await;
        }
    }

    /// Handle a report against the current or most recent partner
    async fn handle_report(&mut self, user_id: UserId, reason: String) {
        let Some(client) = self.clients.get(&user_id) else {
            return;
        };

        let Some(reported) = client.last_partner else {
            let _ = client
                .send(ServerMessage::Error {
                    code: ErrorCode::InvalidMessage,
                    message: "No partner to report".to_string(),
                })
                .await;
            return;
        };

        match self.sessions.report(user_id, reported, reason) {
            Ok(()) => {
                let _ = client.send(ServerMessage::ReportFiled).await;
            }
            Err(err) => {
                let _ = client.send(err.into()).await;
            }
        }
    }

    /// Handle an engine-side session event for a user
    async fn handle_session_notice(&mut self, user_id: UserId, event: SessionEvent) {
        match event {
            SessionEvent::Matched { room_id, partner } => {
                self.handle_matched(user_id, room_id, partner).await;
            }
            SessionEvent::SearchTimedOut => {
                if let Some(client) = self.clients.get(&user_id) {
                    let _ = client.send(ServerMessage::SearchTimeout).await;
                }
            }
        }
    }

    /// Announce a match and start forwarding the room's events
    async fn handle_matched(&mut self, user_id: UserId, room_id: RoomId, partner: UserId) {
        let (partner_nickname, partner_avatar, partner_name) = match self.clients.get(&partner) {
            Some(p) => (
                p.profile.nickname.clone(),
                p.profile.avatar_glyph.clone(),
                p.display_name().to_string(),
            ),
            None => (None, "❓".to_string(), "Stranger".to_string()),
        };

        let Some(client) = self.clients.get_mut(&user_id) else {
            return;
        };
        client.last_partner = Some(partner);

        let _ = client
            .send(ServerMessage::Matched {
                room_id: room_id.to_string(),
                partner_nickname,
                partner_avatar,
            })
            .await;

        let mut room_rx = match self.messenger.subscribe(room_id, user_id) {
            Ok(rx) => rx,
            Err(err) => {
                // Room already ended between pairing and subscribing
                debug!("Subscribe failed for {} in {}: {}", user_id, room_id, err);
                let _ = client.send(ServerMessage::RoomEnded).await;
                return;
            }
        };

        let sender = client.sender.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = room_rx.recv().await {
                let result = match event {
                    RoomEvent::Message(m) => {
                        // The author renders their own message locally
                        if m.author_id == user_id {
                            continue;
                        }
                        sender
                            .send(ServerMessage::Chat {
                                from: partner_name.clone(),
                                content: m.content,
                            })
                            .await
                    }
                    RoomEvent::Typing { typing: true, .. } => {
                        sender.send(ServerMessage::PartnerTyping).await
                    }
                    RoomEvent::Typing { typing: false, .. } => {
                        sender.send(ServerMessage::PartnerStopTyping).await
                    }
                    RoomEvent::Ended => {
                        let _ = sender.send(ServerMessage::RoomEnded).await;
                        break;
                    }
                };
                if result.is_err() {
                    warn!("Dropping room forwarding for {}: client gone", user_id);
                    break;
                }
            }
        });
        client.set_room_task(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connect(
        cmd_tx: &mpsc::Sender<ServerCommand>,
    ) -> (UserId, mpsc::Receiver<ServerMessage>) {
        let user_id = UserId::new();
        let (tx, mut rx) = mpsc::channel(32);
        cmd_tx
            .send(ServerCommand::Connect { user_id, sender: tx })
            .await
            .unwrap();
        assert!(matches!(
            rx.recv().await.unwrap(),
            ServerMessage::Connected { .. }
        ));
        (user_id, rx)
    }

    /// Receive messages until one matches the predicate
    async fn recv_until<F>(rx: &mut mpsc::Receiver<ServerMessage>, mut pred: F) -> ServerMessage
    where
        F: FnMut(&ServerMessage) -> bool,
    {
        loop {
            let msg = rx.recv().await.expect("channel closed while waiting");
            if pred(&msg) {
                return msg;
            }
        }
    }

    fn spawn_server() -> mpsc::Sender<ServerCommand> {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let server = MatchServer::new(cmd_rx, cmd_tx.clone(), EngineConfig::default());
        tokio::spawn(server.run());
        cmd_tx
    }

    #[tokio::test(start_paused = true)]
    async fn test_match_chat_and_leave_flow() {
        let cmd_tx = spawn_server();

        let (a, mut rx_a) = connect(&cmd_tx).await;
        let (b, mut rx_b) = connect(&cmd_tx).await;

        cmd_tx
            .send(ServerCommand::SetNickname {
                user_id: a,
                nickname: "Alice".to_string(),
            })
            .await
            .unwrap();
        assert!(matches!(
            rx_a.recv().await.unwrap(),
            ServerMessage::NicknameSet { .. }
        ));

        cmd_tx
            .send(ServerCommand::StartSearch { user_id: a })
            .await
            .unwrap();
        assert!(matches!(rx_a.recv().await.unwrap(), ServerMessage::Searching));

        cmd_tx
            .send(ServerCommand::StartSearch { user_id: b })
            .await
            .unwrap();
        assert!(matches!(rx_b.recv().await.unwrap(), ServerMessage::Searching));

        // Both sides get matched into the same room
        assert!(matches!(
            recv_until(&mut rx_a, |m| matches!(m, ServerMessage::Matched { .. })).await,
            ServerMessage::Matched { .. }
        ));
        let matched_b =
            recv_until(&mut rx_b, |m| matches!(m, ServerMessage::Matched { .. })).await;
        match matched_b {
            ServerMessage::Matched {
                partner_nickname, ..
            } => assert_eq!(partner_nickname.as_deref(), Some("Alice")),
            _ => unreachable!(),
        }

        // Chat is filtered and delivered to the partner only
        cmd_tx
            .send(ServerCommand::Chat {
                user_id: a,
                content: "hello spam".to_string(),
            })
            .await
            .unwrap();
        let chat = recv_until(&mut rx_b, |m| matches!(m, ServerMessage::Chat { .. })).await;
        match chat {
            ServerMessage::Chat { from, content } => {
                assert_eq!(from, "Alice");
                assert_eq!(content, "hello ****");
            }
            _ => unreachable!(),
        }

        // Typing reaches the partner and auto-clears
        cmd_tx
            .send(ServerCommand::Typing {
                user_id: a,
                typing: true,
            })
            .await
            .unwrap();
        assert!(matches!(
            recv_until(&mut rx_b, |m| matches!(m, ServerMessage::PartnerTyping)).await,
            ServerMessage::PartnerTyping
        ));
        assert!(matches!(
            recv_until(&mut rx_b, |m| matches!(m, ServerMessage::PartnerStopTyping)).await,
            ServerMessage::PartnerStopTyping
        ));

        // Reporting the partner works from either side
        cmd_tx
            .send(ServerCommand::Report {
                user_id: b,
                reason: "spamming".to_string(),
            })
            .await
            .unwrap();
        assert!(matches!(
            recv_until(&mut rx_b, |m| matches!(m, ServerMessage::ReportFiled)).await,
            ServerMessage::ReportFiled
        ));

        // Leaving ends the room for both members
        cmd_tx
            .send(ServerCommand::LeaveChat { user_id: a })
            .await
            .unwrap();
        assert!(matches!(
            recv_until(&mut rx_a, |m| matches!(m, ServerMessage::Left)).await,
            ServerMessage::Left
        ));
        assert!(matches!(
            recv_until(&mut rx_b, |m| matches!(m, ServerMessage::RoomEnded)).await,
            ServerMessage::RoomEnded
        ));

        // Posting into the ended room is rejected with a reason code
        cmd_tx
            .send(ServerCommand::Chat {
                user_id: b,
                content: "anyone?".to_string(),
            })
            .await
            .unwrap();
        let err = recv_until(&mut rx_b, |m| matches!(m, ServerMessage::Error { .. })).await;
        match err {
            ServerMessage::Error { code, .. } => {
                assert!(matches!(code, ErrorCode::RoomNotActive));
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_lone_searcher_times_out() {
        let cmd_tx = spawn_server();
        let (a, mut rx_a) = connect(&cmd_tx).await;

        cmd_tx
            .send(ServerCommand::StartSearch { user_id: a })
            .await
            .unwrap();
        assert!(matches!(rx_a.recv().await.unwrap(), ServerMessage::Searching));
        assert!(matches!(
            recv_until(&mut rx_a, |m| matches!(m, ServerMessage::SearchTimeout)).await,
            ServerMessage::SearchTimeout
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_without_room_is_rejected() {
        let cmd_tx = spawn_server();
        let (a, mut rx_a) = connect(&cmd_tx).await;

        cmd_tx
            .send(ServerCommand::Chat {
                user_id: a,
                content: "hello?".to_string(),
            })
            .await
            .unwrap();
        let err = recv_until(&mut rx_a, |m| matches!(m, ServerMessage::Error { .. })).await;
        match err {
            ServerMessage::Error { code, .. } => {
                assert!(matches!(code, ErrorCode::RoomNotActive));
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_rotates_partners() {
        let cmd_tx = spawn_server();
        let (a, mut rx_a) = connect(&cmd_tx).await;
        let (b, mut rx_b) = connect(&cmd_tx).await;
        let (c, mut rx_c) = connect(&cmd_tx).await;

        cmd_tx
            .send(ServerCommand::StartSearch { user_id: a })
            .await
            .unwrap();
        cmd_tx
            .send(ServerCommand::StartSearch { user_id: b })
            .await
            .unwrap();
        let first = recv_until(&mut rx_a, |m| matches!(m, ServerMessage::Matched { .. })).await;
        recv_until(&mut rx_b, |m| matches!(m, ServerMessage::Matched { .. })).await;

        // a moves on; b's room ends; c becomes a's new partner
        cmd_tx
            .send(ServerCommand::NextChat { user_id: a })
            .await
            .unwrap();
        recv_until(&mut rx_b, |m| matches!(m, ServerMessage::RoomEnded)).await;

        cmd_tx
            .send(ServerCommand::StartSearch { user_id: c })
            .await
            .unwrap();
        let second = recv_until(&mut rx_a, |m| matches!(m, ServerMessage::Matched { .. })).await;
        recv_until(&mut rx_c, |m| matches!(m, ServerMessage::Matched { .. })).await;

        let room_of = |msg: &ServerMessage| match msg {
            ServerMessage::Matched { room_id, .. } => room_id.clone(),
            _ => unreachable!(),
        };
        assert_ne!(room_of(&first), room_of(&second));
    }
}
