//! Pairing engine
//!
//! Matches a searching user against the waiting pool, oldest-enqueued
//! candidate first. The race between concurrent attempts is closed in two
//! layers: the pool consumes candidate and caller atomically, and room
//! creation rejects any member who already holds an active room. A rejected
//! candidate is simply retried against the pool; the retry never surfaces
//! to callers.

use std::sync::Arc;

use tracing::debug;

use crate::pool::WaitingPool;
use crate::rooms::{CreateRoomError, RoomHandle, RoomRegistry};
use crate::types::UserId;

/// FIFO matchmaker over the waiting pool and room registry
#[derive(Debug)]
pub struct Matchmaker {
    pool: WaitingPool,
    rooms: Arc<RoomRegistry>,
}

impl Matchmaker {
    /// Create a matchmaker backed by the given registry
    pub fn new(rooms: Arc<RoomRegistry>) -> Self {
        Self {
            pool: WaitingPool::new(),
            rooms,
        }
    }

    /// The waiting pool this matchmaker consumes
    pub fn pool(&self) -> &WaitingPool {
        &self.pool
    }

    /// Attempt to pair `user` with a waiting partner
    ///
    /// Returns the user's active room if one already exists (the partner's
    /// attempt may have paired them first), otherwise consumes the oldest
    /// other waiting entry and creates a room. `None` means no match yet;
    /// the caller's entry always stays enqueued in that case, even when
    /// earlier iterations consumed it alongside a candidate that fell
    /// through.
    pub fn try_pair(&self, user: UserId) -> Option<Arc<RoomHandle>> {
        if let Some(room) = self.rooms.active_room_for(user) {
            return Some(room);
        }

        let mut own_entry_taken = false;
        loop {
            let Some(candidate) = self.pool.take_oldest_excluding(user) else {
                if own_entry_taken {
                    self.pool.enqueue(user);
                }
                return None;
            };
            own_entry_taken = true;

            match self.rooms.create(user, candidate) {
                Ok(room) => {
                    debug!("Paired {} with {} in room {}", user, candidate, room.id);
                    return Some(room);
                }
                Err(CreateRoomError::MemberBusy(busy)) if busy == user => {
                    // The caller got paired concurrently; the candidate
                    // keeps waiting.
                    self.pool.enqueue(candidate);
                    if let Some(room) = self.rooms.active_room_for(user) {
                        return Some(room);
                    }
                    // That room already ended; keep pairing.
                }
                Err(err) => {
                    // Candidate was consumed concurrently; retry the pool.
                    debug!("Pairing retry for {}: {}", user, err);
                }
            }
        }
    }
}
