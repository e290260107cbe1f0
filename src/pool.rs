//! Waiting pool
//!
//! The set of users currently seeking a partner, ordered oldest-first by a
//! monotone enqueue sequence. All operations are atomic under one mutex; in
//! particular `take_oldest_excluding` performs the compound
//! "pick candidate + consume both entries" step that concurrent pairing
//! attempts race on, so two attempts can never select the same candidate.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::types::UserId;

/// Internal pool state: per-user entry plus an ordered FIFO index
#[derive(Debug, Default)]
struct PoolInner {
    /// Next enqueue sequence number
    next_seq: u64,
    /// Entry lookup: user -> enqueue sequence
    by_user: HashMap<UserId, u64>,
    /// FIFO index: enqueue sequence -> user
    by_seq: BTreeMap<u64, UserId>,
}

/// Mutex-guarded set of waiting users with FIFO candidate selection
#[derive(Debug, Default)]
pub struct WaitingPool {
    inner: Mutex<PoolInner>,
}

impl WaitingPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace the waiting entry for `user`
    ///
    /// Re-enqueuing refreshes the user's position (fresh enqueue time).
    pub fn enqueue(&self, user: UserId) {
        let mut inner = self.lock();
        if let Some(old_seq) = inner.by_user.remove(&user) {
            inner.by_seq.remove(&old_seq);
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.by_user.insert(user, seq);
        inner.by_seq.insert(seq, user);
    }

    /// Remove the entry for `user` if present; no-op otherwise
    ///
    /// Returns whether an entry was removed.
    pub fn dequeue(&self, user: UserId) -> bool {
        let mut inner = self.lock();
        match inner.by_user.remove(&user) {
            Some(seq) => {
                inner.by_seq.remove(&seq);
                true
            }
            None => false,
        }
    }

    /// Check whether `user` is currently waiting
    pub fn contains(&self, user: UserId) -> bool {
        self.lock().by_user.contains_key(&user)
    }

    /// Number of waiting users
    pub fn len(&self) -> usize {
        self.lock().by_user.len()
    }

    /// Check whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Atomically consume the oldest waiting user other than `caller`
    ///
    /// On success the candidate's entry AND the caller's own entry (if any)
    /// are both removed in the same locked step. If no other user is
    /// waiting, `None` is returned and nothing is removed; the caller's
    /// entry stays enqueued.
    pub fn take_oldest_excluding(&self, caller: UserId) -> Option<UserId> {
        let mut inner = self.lock();
        let found = inner
            .by_seq
            .iter()
            .find(|(_, user)| **user != caller)
            .map(|(seq, user)| (*seq, *user));
        let (seq, candidate) = found?;
        inner.by_seq.remove(&seq);
        inner.by_user.remove(&candidate);
        if let Some(own_seq) = inner.by_user.remove(&caller) {
            inner.by_seq.remove(&own_seq);
        }
        Some(candidate)
    }
}
