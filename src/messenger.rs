//! Session messenger
//!
//! Per-room ordered messaging plus the ephemeral typing channel. All
//! delivery happens under the room's mutex with unbounded senders, so every
//! subscriber observes one consistent order per room. Content is passed
//! through the profanity filter before it is stored; the log never holds
//! unfiltered text.
//!
//! Typing signals are transient: asserted on edit, delivered only to the
//! other member, auto-cleared after a quiet period without refresh and
//! implicitly cleared when the room ends or the author posts a message.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::AppError;
use crate::filter::ProfanityFilter;
use crate::rooms::{Message, RoomEvent, RoomHandle, RoomRegistry, Subscriber};
use crate::types::{MessageId, RoomId, UserId};

/// Ordered message log + typing channel over active rooms
#[derive(Debug)]
pub struct SessionMessenger {
    rooms: Arc<RoomRegistry>,
    filter: Arc<ProfanityFilter>,
    typing_quiet_period: Duration,
}

impl SessionMessenger {
    /// Create a messenger over the given registry and filter
    pub fn new(
        rooms: Arc<RoomRegistry>,
        filter: Arc<ProfanityFilter>,
        typing_quiet_period: Duration,
    ) -> Self {
        Self {
            rooms,
            filter,
            typing_quiet_period,
        }
    }

    /// Resolve a room for a member operation
    fn member_room(&self, room_id: RoomId, user: UserId) -> Result<Arc<RoomHandle>, AppError> {
        let room = self.rooms.get(room_id).ok_or(AppError::RoomNotActive)?;
        if !room.is_member(user) {
            return Err(AppError::RoomNotActive);
        }
        Ok(room)
    }

    /// Post a message to an active room
    ///
    /// Filters the content, assigns the next room sequence number, appends
    /// to the log and delivers to every live subscription, all under the
    /// room lock. Posting clears the author's typing signal first.
    pub fn post_message(
        &self,
        room_id: RoomId,
        author: UserId,
        content: &str,
    ) -> Result<Message, AppError> {
        let room = self.member_room(room_id, author)?;
        let filtered = self.filter.filter(content);

        let mut inner = room.lock_inner();
        if inner.ended_at.is_some() {
            return Err(AppError::RoomNotActive);
        }

        if inner.typing_gen.remove(&author).is_some() {
            inner.notify_others(
                author,
                &RoomEvent::Typing {
                    user_id: author,
                    typing: false,
                },
            );
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        let message = Message {
            id: MessageId::new(),
            room_id,
            author_id: author,
            content: filtered,
            seq,
            created_at: SystemTime::now(),
        };
        inner.log.push(message.clone());
        inner.broadcast(&RoomEvent::Message(message.clone()));

        debug!("Message {} posted to room {}", message.seq, room_id);
        Ok(message)
    }

    /// Subscribe a member to a room's event stream
    ///
    /// The current log is replayed in order before any live event; a fresh
    /// subscribe always starts with the full history. The stream closes
    /// with a terminal `Ended` event when the room ends.
    pub fn subscribe(
        &self,
        room_id: RoomId,
        user: UserId,
    ) -> Result<mpsc::UnboundedReceiver<RoomEvent>, AppError> {
        let room = self.member_room(room_id, user)?;

        let mut inner = room.lock_inner();
        if inner.ended_at.is_some() {
            return Err(AppError::RoomNotActive);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for message in &inner.log {
            let _ = tx.send(RoomEvent::Message(message.clone()));
        }
        inner.subscribers.push(Subscriber { user_id: user, tx });
        Ok(rx)
    }

    /// Update a member's transient typing signal
    ///
    /// Notifies only the other member. An asserted signal that is not
    /// refreshed within the quiet period is cleared by a timer; a stale
    /// timer is recognized by its assertion generation and does nothing.
    pub fn set_typing(
        &self,
        room_id: RoomId,
        user: UserId,
        typing: bool,
    ) -> Result<(), AppError> {
        let room = self.member_room(room_id, user)?;

        let mut inner = room.lock_inner();
        if inner.ended_at.is_some() {
            return Err(AppError::RoomNotActive);
        }

        if typing {
            let was_typing = inner.typing_gen.contains_key(&user);
            let generation = inner.next_typing_gen;
            inner.next_typing_gen += 1;
            inner.typing_gen.insert(user, generation);
            if !was_typing {
                inner.notify_others(
                    user,
                    &RoomEvent::Typing {
                        user_id: user,
                        typing: true,
                    },
                );
            }
            drop(inner);

            let room = Arc::clone(&room);
            let quiet = self.typing_quiet_period;
            tokio::spawn(async move {
                tokio::time::sleep(quiet).await;
                let mut inner = room.lock_inner();
                if inner.ended_at.is_some() {
                    return;
                }
                if inner.typing_gen.get(&user) == Some(&generation) {
                    inner.typing_gen.remove(&user);
                    inner.notify_others(
                        user,
                        &RoomEvent::Typing {
                            user_id: user,
                            typing: false,
                        },
                    );
                }
            });
        } else if inner.typing_gen.remove(&user).is_some() {
            inner.notify_others(
                user,
                &RoomEvent::Typing {
                    user_id: user,
                    typing: false,
                },
            );
        }
        Ok(())
    }
}
