//! Room lifecycle manager
//!
//! Rooms are ephemeral two-party chat sessions with an `Active → Ended`
//! lifecycle. The registry owns every room plus the active-room-per-user
//! index; `create` is conditional (it rejects a member who already has an
//! active room) and `end` is idempotent. Rooms are retained after ending as
//! closed historical records.
//!
//! Per-room chat state (message log, sequence counter, subscriptions,
//! typing signals) lives behind the room's own mutex, so message ordering
//! only requires room-scoped serialization.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Instant, SystemTime};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::types::{MessageId, RoomId, UserId};

/// A chat message stored in a room's log
///
/// Immutable once created; content has already passed the profanity filter.
/// `seq` is the room-scoped total order.
#[derive(Debug, Clone)]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,
    /// Room this message belongs to
    pub room_id: RoomId,
    /// Author (one of the room's two members)
    pub author_id: UserId,
    /// Filtered message text
    pub content: String,
    /// Per-room monotone sequence number
    pub seq: u64,
    /// Wall-clock creation time
    pub created_at: SystemTime,
}

/// Event delivered on a room subscription
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// A chat message (backfilled or live)
    Message(Message),
    /// Transient typing signal from a member
    Typing { user_id: UserId, typing: bool },
    /// Terminal notification: the room ended (not an error)
    Ended,
}

/// A live subscription sink
#[derive(Debug)]
pub(crate) struct Subscriber {
    pub(crate) user_id: UserId,
    pub(crate) tx: mpsc::UnboundedSender<RoomEvent>,
}

/// Mutable room state, guarded by the room's mutex
#[derive(Debug, Default)]
pub(crate) struct RoomInner {
    /// Set exactly once; `Some` means ended (terminal)
    pub(crate) ended_at: Option<Instant>,
    /// Next message sequence number
    pub(crate) next_seq: u64,
    /// Ordered message log
    pub(crate) log: Vec<Message>,
    /// Live subscriptions
    pub(crate) subscribers: Vec<Subscriber>,
    /// Asserted typing signals: user -> assertion generation
    pub(crate) typing_gen: HashMap<UserId, u64>,
    /// Next typing assertion generation
    pub(crate) next_typing_gen: u64,
}

impl RoomInner {
    /// Deliver an event to every live subscription, dropping closed ones
    pub(crate) fn broadcast(&mut self, event: &RoomEvent) {
        self.subscribers
            .retain(|s| s.tx.send(event.clone()).is_ok());
    }

    /// Deliver an event to every member's subscription except `sender`'s
    pub(crate) fn notify_others(&mut self, sender: UserId, event: &RoomEvent) {
        self.subscribers.retain(|s| {
            if s.user_id == sender {
                true
            } else {
                s.tx.send(event.clone()).is_ok()
            }
        });
    }
}

/// An active or ended two-party room
#[derive(Debug)]
pub struct RoomHandle {
    /// Room ID
    pub id: RoomId,
    /// The two members; always distinct
    pub members: [UserId; 2],
    /// Creation time
    pub created_at: Instant,
    pub(crate) inner: Mutex<RoomInner>,
}

impl RoomHandle {
    pub(crate) fn lock_inner(&self) -> MutexGuard<'_, RoomInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check whether `user` is one of the two members
    pub fn is_member(&self, user: UserId) -> bool {
        self.members[0] == user || self.members[1] == user
    }

    /// Get the other member for a given member
    ///
    /// Returns None if `user` is not in the room.
    pub fn partner_of(&self, user: UserId) -> Option<UserId> {
        if self.members[0] == user {
            Some(self.members[1])
        } else if self.members[1] == user {
            Some(self.members[0])
        } else {
            None
        }
    }

    /// Check whether the room has not ended yet
    pub fn is_active(&self) -> bool {
        self.lock_inner().ended_at.is_none()
    }
}

/// Room creation failures, resolved internally by the pairing engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CreateRoomError {
    /// A user cannot be paired with themselves
    #[error("Room members must be distinct")]
    SameUser,
    /// The named user already has an active room
    #[error("User {0} already has an active room")]
    MemberBusy(UserId),
}

/// Registry state: all rooms plus the active-room index
#[derive(Debug, Default)]
struct RegistryInner {
    rooms: HashMap<RoomId, Arc<RoomHandle>>,
    active_by_user: HashMap<UserId, RoomId>,
}

/// Owner of all rooms and the at-most-one-active-room-per-user invariant
#[derive(Debug, Default)]
pub struct RoomRegistry {
    inner: Mutex<RegistryInner>,
}

impl RoomRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an active room for two distinct, currently unpaired users
    ///
    /// The busy check and the index insertion happen under one lock, so two
    /// concurrent creations can never both claim the same user.
    pub fn create(&self, a: UserId, b: UserId) -> Result<Arc<RoomHandle>, CreateRoomError> {
        if a == b {
            return Err(CreateRoomError::SameUser);
        }

        let mut reg = self.lock();
        if reg.active_by_user.contains_key(&a) {
            return Err(CreateRoomError::MemberBusy(a));
        }
        if reg.active_by_user.contains_key(&b) {
            return Err(CreateRoomError::MemberBusy(b));
        }

        let room = Arc::new(RoomHandle {
            id: RoomId::new(),
            members: [a, b],
            created_at: Instant::now(),
            inner: Mutex::new(RoomInner::default()),
        });
        reg.rooms.insert(room.id, Arc::clone(&room));
        reg.active_by_user.insert(a, room.id);
        reg.active_by_user.insert(b, room.id);

        info!("Room {} created for {} and {}", room.id, a, b);
        Ok(room)
    }

    /// Look up a room (active or ended)
    pub fn get(&self, room_id: RoomId) -> Option<Arc<RoomHandle>> {
        self.lock().rooms.get(&room_id).cloned()
    }

    /// Look up the active room containing `user`, if any
    pub fn active_room_for(&self, user: UserId) -> Option<Arc<RoomHandle>> {
        let reg = self.lock();
        let room_id = reg.active_by_user.get(&user)?;
        reg.rooms.get(room_id).cloned()
    }

    /// All currently active rooms
    pub fn active_rooms(&self) -> Vec<Arc<RoomHandle>> {
        let reg = self.lock();
        reg.active_by_user
            .values()
            .filter_map(|id| reg.rooms.get(id).cloned())
            .map(|room| (room.id, room))
            .collect::<HashMap<_, _>>()
            .into_values()
            .collect()
    }

    /// End a room: idempotent `Active → Ended` transition
    ///
    /// Closes every live subscription with a terminal `Ended` event, clears
    /// typing state and releases both members' active-index entries.
    /// Returns whether this call performed the transition.
    pub fn end(&self, room_id: RoomId) -> bool {
        let room = self.lock().rooms.get(&room_id).cloned();
        let Some(room) = room else {
            return false;
        };

        let ended_now = {
            let mut inner = room.lock_inner();
            if inner.ended_at.is_some() {
                false
            } else {
                inner.ended_at = Some(Instant::now());
                inner.typing_gen.clear();
                let subscribers = std::mem::take(&mut inner.subscribers);
                for sub in subscribers {
                    let _ = sub.tx.send(RoomEvent::Ended);
                }
                true
            }
        };

        if ended_now {
            let mut reg = self.lock();
            for member in room.members {
                if reg.active_by_user.get(&member) == Some(&room.id) {
                    reg.active_by_user.remove(&member);
                }
            }
            debug!("Room {} ended", room.id);
        }

        ended_now
    }
}
