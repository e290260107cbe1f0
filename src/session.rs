//! Client session controller
//!
//! Per-user state machine driving the search/chat cycle:
//! `Idle → Searching → Paired → Idle` (leave) or back to `Searching`
//! (next). Searching runs as a bounded poll loop against the matchmaker
//! (the reference behavior: retry every 2s, give up after 30s); pairing
//! outcomes are pushed on the user's session event channel.
//!
//! Every exit path releases the user's resources: pairing, timeout,
//! explicit leave and connection teardown all clear the waiting entry and
//! end any bound room. A generation counter ties each search task to the
//! state that spawned it, so a cancelled task can never bind a stale match.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::AppError;
use crate::pairing::Matchmaker;
use crate::reports::ReportLog;
use crate::rooms::{RoomHandle, RoomRegistry};
use crate::types::{RoomId, UserId};

/// Event pushed on a user's session channel
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The user was paired into a room
    Matched { room_id: RoomId, partner: UserId },
    /// The bounded search gave up without a match
    SearchTimedOut,
}

/// Observable session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Searching,
    Paired,
}

/// Outcome of a search request; the non-`Started` cases are benign no-ops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStart {
    Started,
    AlreadySearching,
    AlreadyPaired,
}

#[derive(Debug, Clone, Copy)]
enum SessionState {
    Idle,
    Searching { generation: u64 },
    Paired { room_id: RoomId },
}

#[derive(Debug)]
struct SessionEntry {
    state: SessionState,
    events: mpsc::UnboundedSender<SessionEvent>,
    /// Monotone counter; bumping it invalidates any running search task
    search_gen: u64,
}

#[derive(Debug)]
struct ControllerInner {
    matchmaker: Arc<Matchmaker>,
    rooms: Arc<RoomRegistry>,
    reports: Arc<ReportLog>,
    config: EngineConfig,
    sessions: Mutex<HashMap<UserId, SessionEntry>>,
}

impl ControllerInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn room_is_active(&self, room_id: RoomId) -> bool {
        self.rooms.get(room_id).map(|r| r.is_active()).unwrap_or(false)
    }

    fn is_current_search(&self, user: UserId, generation: u64) -> bool {
        self.lock().get(&user).is_some_and(|entry| {
            matches!(entry.state, SessionState::Searching { generation: g } if g == generation)
        })
    }

    /// Move a searching user to `Paired` and push the match event
    ///
    /// Returns whether the room was bound. Either side may have left or
    /// disconnected between pairing and binding; such a room must not
    /// outlive a session, so it is ended and `false` is returned.
    fn bind_room(&self, user: UserId, generation: u64, room: &Arc<RoomHandle>) -> bool {
        let mut sessions = self.lock();

        let caller_current = matches!(
            sessions.get(&user).map(|entry| entry.state),
            Some(SessionState::Searching { generation: g }) if g == generation
        );
        let partner_present = room.partner_of(user).is_some_and(|partner| {
            sessions.get(&partner).is_some_and(|entry| match entry.state {
                SessionState::Searching { .. } => true,
                SessionState::Paired { room_id } => room_id == room.id,
                SessionState::Idle => false,
            })
        });

        if !caller_current || !partner_present {
            drop(sessions);
            self.rooms.end(room.id);
            return false;
        }

        if let Some(entry) = sessions.get_mut(&user) {
            entry.state = SessionState::Paired { room_id: room.id };
            if let Some(partner) = room.partner_of(user) {
                let _ = entry.events.send(SessionEvent::Matched {
                    room_id: room.id,
                    partner,
                });
            }
            info!("User {} paired in room {}", user, room.id);
        }
        true
    }

    /// Restore the pool entry after a pairing that fell through
    fn reenqueue_if_searching(&self, user: UserId, generation: u64) {
        let sessions = self.lock();
        if let Some(entry) = sessions.get(&user) {
            if matches!(entry.state, SessionState::Searching { generation: g } if g == generation) {
                self.matchmaker.pool().enqueue(user);
            }
        }
    }

    /// Bounded-wait expiry: drop the pool entry and notify the user
    fn expire_search(&self, user: UserId, generation: u64) {
        let mut sessions = self.lock();
        if let Some(entry) = sessions.get_mut(&user) {
            if matches!(entry.state, SessionState::Searching { generation: g } if g == generation) {
                entry.state = SessionState::Idle;
                self.matchmaker.pool().dequeue(user);
                let _ = entry.events.send(SessionEvent::SearchTimedOut);
                info!("Search timed out for {}", user);
            }
        }
    }
}

/// Owner of per-user session state machines
///
/// Cheap to clone; all clones share one state table.
#[derive(Debug, Clone)]
pub struct SessionController {
    inner: Arc<ControllerInner>,
}

impl SessionController {
    /// Create a controller over the given engine components
    pub fn new(
        matchmaker: Arc<Matchmaker>,
        rooms: Arc<RoomRegistry>,
        reports: Arc<ReportLog>,
        config: EngineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                matchmaker,
                rooms,
                reports,
                config,
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Bind a session event channel for `user`
    ///
    /// Any previous session for the same user is torn down first
    /// (re-attach replaces).
    pub fn attach(&self, user: UserId) -> mpsc::UnboundedReceiver<SessionEvent> {
        let _ = self.leave(user);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().insert(
            user,
            SessionEntry {
                state: SessionState::Idle,
                events: tx,
                search_gen: 0,
            },
        );
        debug!("Session attached for {}", user);
        rx
    }

    /// Tear down `user`'s session: leave, then release the entry
    ///
    /// Connection teardown hook; safe to call for an unknown user.
    pub fn detach(&self, user: UserId) {
        let _ = self.leave(user);
        self.inner.lock().remove(&user);
        debug!("Session detached for {}", user);
    }

    /// Observable state of a user's session
    pub fn status(&self, user: UserId) -> Option<SessionStatus> {
        self.inner.lock().get(&user).map(|entry| match entry.state {
            SessionState::Idle => SessionStatus::Idle,
            SessionState::Searching { .. } => SessionStatus::Searching,
            SessionState::Paired { .. } => SessionStatus::Paired,
        })
    }

    /// Enter the waiting pool and start a bounded pairing poll
    ///
    /// `AlreadySearching` / `AlreadyPaired` are benign statuses, not
    /// failures. A `Paired` session whose room has meanwhile ended is
    /// resynchronized to `Idle` and the search starts normally.
    pub fn start_search(&self, user: UserId) -> Result<SearchStart, AppError> {
        let generation = {
            let mut sessions = self.inner.lock();
            let entry = sessions.get_mut(&user).ok_or(AppError::NotAuthenticated)?;
            match entry.state {
                SessionState::Searching { .. } => return Ok(SearchStart::AlreadySearching),
                SessionState::Paired { room_id } if self.inner.room_is_active(room_id) => {
                    return Ok(SearchStart::AlreadyPaired);
                }
                // Idle, or Paired against a room that already ended
                _ => {}
            }
            entry.search_gen += 1;
            let generation = entry.search_gen;
            entry.state = SessionState::Searching { generation };
            self.inner.matchmaker.pool().enqueue(user);
            generation
        };

        info!("User {} searching", user);
        self.spawn_search_loop(user, generation);
        Ok(SearchStart::Started)
    }

    /// End the current room and immediately search again
    pub fn next(&self, user: UserId) -> Result<SearchStart, AppError> {
        let (ended_room, generation) = {
            let mut sessions = self.inner.lock();
            let entry = sessions.get_mut(&user).ok_or(AppError::NotAuthenticated)?;
            let ended_room = match entry.state {
                SessionState::Searching { .. } => return Ok(SearchStart::AlreadySearching),
                SessionState::Paired { room_id } => Some(room_id),
                SessionState::Idle => None,
            };
            entry.search_gen += 1;
            let generation = entry.search_gen;
            entry.state = SessionState::Searching { generation };
            (ended_room, generation)
        };

        // End before re-entering the pool, so the old room can never be
        // observed as the user's active room by the new search.
        if let Some(room_id) = ended_room {
            self.inner.rooms.end(room_id);
        }

        {
            let mut sessions = self.inner.lock();
            if let Some(entry) = sessions.get_mut(&user) {
                if matches!(entry.state, SessionState::Searching { generation: g } if g == generation)
                {
                    self.inner.matchmaker.pool().enqueue(user);
                }
            }
        }

        info!("User {} moved to next chat", user);
        self.spawn_search_loop(user, generation);
        Ok(SearchStart::Started)
    }

    /// Cancel any search, end any room, return to `Idle`
    ///
    /// All pool and room resources are released synchronously.
    pub fn leave(&self, user: UserId) -> Result<(), AppError> {
        let ended_room = {
            let mut sessions = self.inner.lock();
            let entry = sessions.get_mut(&user).ok_or(AppError::NotAuthenticated)?;
            entry.search_gen += 1;
            let ended_room = match entry.state {
                SessionState::Paired { room_id } => Some(room_id),
                _ => None,
            };
            entry.state = SessionState::Idle;
            self.inner.matchmaker.pool().dequeue(user);
            ended_room
        };

        if let Some(room_id) = ended_room {
            self.inner.rooms.end(room_id);
        }
        // A pairing attempt may have created a room for the user after the
        // state reset above; it must not survive the leave.
        if let Some(room) = self.inner.rooms.active_room_for(user) {
            self.inner.rooms.end(room.id);
        }

        info!("User {} left", user);
        Ok(())
    }

    /// File a report; independent of session state
    ///
    /// Requires an attached session for the reporter, nothing else. Never
    /// affects pairing or room state; the reported partner may come from an
    /// already-ended room.
    pub fn report(
        &self,
        reporter: UserId,
        reported: UserId,
        reason: impl Into<String>,
    ) -> Result<(), AppError> {
        if !self.inner.lock().contains_key(&reporter) {
            return Err(AppError::NotAuthenticated);
        }
        self.inner.reports.file(reporter, reported, reason);
        Ok(())
    }

    fn spawn_search_loop(&self, user: UserId, generation: u64) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let deadline = Instant::now() + inner.config.search_timeout;
            loop {
                if !inner.is_current_search(user, generation) {
                    return;
                }
                if let Some(room) = inner.matchmaker.try_pair(user) {
                    if inner.bind_room(user, generation, &room) {
                        return;
                    }
                    // The partner withdrew before binding; rejoin the pool
                    // and keep polling.
                    inner.reenqueue_if_searching(user, generation);
                }
                if Instant::now() >= deadline {
                    inner.expire_search(user, generation);
                    return;
                }
                sleep(inner.config.poll_interval).await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn setup() -> (Arc<RoomRegistry>, SessionController) {
        let rooms = Arc::new(RoomRegistry::new());
        let matchmaker = Arc::new(Matchmaker::new(Arc::clone(&rooms)));
        let reports = Arc::new(ReportLog::new());
        let controller = SessionController::new(
            matchmaker,
            Arc::clone(&rooms),
            reports,
            EngineConfig::default(),
        );
        (rooms, controller)
    }

    #[tokio::test]
    async fn test_operations_require_attached_session() {
        let (_, controller) = setup();
        let user = UserId::new();

        assert!(matches!(
            controller.start_search(user),
            Err(AppError::NotAuthenticated)
        ));
        assert!(matches!(controller.leave(user), Err(AppError::NotAuthenticated)));
        assert!(matches!(
            controller.report(user, UserId::new(), "spam"),
            Err(AppError::NotAuthenticated)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_searchers_get_paired() {
        let (rooms, controller) = setup();
        let a = UserId::new();
        let b = UserId::new();
        let mut rx_a = controller.attach(a);
        let mut rx_b = controller.attach(b);

        assert_eq!(controller.start_search(a).unwrap(), SearchStart::Started);
        assert_eq!(controller.start_search(b).unwrap(), SearchStart::Started);

        let (room_a, partner_a) = match rx_a.recv().await.unwrap() {
            SessionEvent::Matched { room_id, partner } => (room_id, partner),
            other => panic!("unexpected event: {:?}", other),
        };
        let (room_b, partner_b) = match rx_b.recv().await.unwrap() {
            SessionEvent::Matched { room_id, partner } => (room_id, partner),
            other => panic!("unexpected event: {:?}", other),
        };

        assert_eq!(room_a, room_b);
        assert_eq!(partner_a, b);
        assert_eq!(partner_b, a);
        assert_eq!(controller.status(a), Some(SessionStatus::Paired));
        assert_eq!(controller.status(b), Some(SessionStatus::Paired));
        assert!(controller.inner.matchmaker.pool().is_empty());
        assert_eq!(rooms.active_rooms().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_search_is_idempotent() {
        let (_, controller) = setup();
        let a = UserId::new();
        let b = UserId::new();
        let mut rx_a = controller.attach(a);
        let _rx_b = controller.attach(b);

        controller.start_search(a).unwrap();
        assert_eq!(
            controller.start_search(a).unwrap(),
            SearchStart::AlreadySearching
        );

        controller.start_search(b).unwrap();
        assert!(matches!(
            rx_a.recv().await.unwrap(),
            SessionEvent::Matched { .. }
        ));
        assert_eq!(
            controller.start_search(a).unwrap(),
            SearchStart::AlreadyPaired
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_times_out_and_releases_pool_entry() {
        let (_, controller) = setup();
        let a = UserId::new();
        let mut rx_a = controller.attach(a);

        controller.start_search(a).unwrap();
        assert!(controller.inner.matchmaker.pool().contains(a));

        assert!(matches!(
            rx_a.recv().await.unwrap(),
            SessionEvent::SearchTimedOut
        ));
        assert_eq!(controller.status(a), Some(SessionStatus::Idle));
        assert!(controller.inner.matchmaker.pool().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_cancels_search() {
        let (_, controller) = setup();
        let a = UserId::new();
        let mut rx_a = controller.attach(a);

        controller.start_search(a).unwrap();
        controller.leave(a).unwrap();

        assert_eq!(controller.status(a), Some(SessionStatus::Idle));
        assert!(controller.inner.matchmaker.pool().is_empty());

        // The cancelled loop must not fire a timeout later
        sleep(Duration::from_secs(40)).await;
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_ends_room() {
        let (rooms, controller) = setup();
        let a = UserId::new();
        let b = UserId::new();
        let mut rx_a = controller.attach(a);
        let _rx_b = controller.attach(b);

        controller.start_search(a).unwrap();
        controller.start_search(b).unwrap();
        let room_id = match rx_a.recv().await.unwrap() {
            SessionEvent::Matched { room_id, .. } => room_id,
            other => panic!("unexpected event: {:?}", other),
        };

        controller.leave(a).unwrap();
        assert_eq!(controller.status(a), Some(SessionStatus::Idle));
        assert!(!rooms.get(room_id).unwrap().is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_room_with_withdrawn_partner_is_ended() {
        let (rooms, controller) = setup();
        let a = UserId::new();
        let b = UserId::new();
        let mut rx_a = controller.attach(a);
        let mut rx_b = controller.attach(b);

        // b is idle but a stale pool entry survived: b's leave completed
        // after a pairing attempt had already consumed the entry.
        controller.inner.matchmaker.pool().enqueue(b);

        controller.start_search(a).unwrap();
        sleep(Duration::from_secs(5)).await;

        // The room created against the withdrawn partner was ended and a
        // is back in the pool, still searching; no match was announced.
        assert!(rooms.active_rooms().is_empty());
        assert_eq!(controller.status(a), Some(SessionStatus::Searching));
        assert_eq!(controller.status(b), Some(SessionStatus::Idle));
        assert!(controller.inner.matchmaker.pool().contains(a));
        assert!(rx_a.try_recv().is_err());

        // A real search from b converges normally afterwards
        controller.start_search(b).unwrap();
        assert!(matches!(
            rx_a.recv().await.unwrap(),
            SessionEvent::Matched { .. }
        ));
        assert!(matches!(
            rx_b.recv().await.unwrap(),
            SessionEvent::Matched { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_partner_resyncs_after_room_ends() {
        let (_, controller) = setup();
        let a = UserId::new();
        let b = UserId::new();
        let mut rx_a = controller.attach(a);
        let _rx_b = controller.attach(b);

        controller.start_search(a).unwrap();
        controller.start_search(b).unwrap();
        assert!(matches!(
            rx_a.recv().await.unwrap(),
            SessionEvent::Matched { .. }
        ));

        controller.leave(a).unwrap();
        // b is still nominally Paired, but the room is gone: a new search
        // resynchronizes instead of reporting AlreadyPaired.
        assert_eq!(controller.start_search(b).unwrap(), SearchStart::Started);
        assert_eq!(controller.status(b), Some(SessionStatus::Searching));
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_ends_room_and_searches_again() {
        let (rooms, controller) = setup();
        let a = UserId::new();
        let b = UserId::new();
        let c = UserId::new();
        let mut rx_a = controller.attach(a);
        let _rx_b = controller.attach(b);
        let mut rx_c = controller.attach(c);

        controller.start_search(a).unwrap();
        controller.start_search(b).unwrap();
        let first_room = match rx_a.recv().await.unwrap() {
            SessionEvent::Matched { room_id, .. } => room_id,
            other => panic!("unexpected event: {:?}", other),
        };

        assert_eq!(controller.next(a).unwrap(), SearchStart::Started);
        assert!(!rooms.get(first_room).unwrap().is_active());
        assert_eq!(controller.status(a), Some(SessionStatus::Searching));

        controller.start_search(c).unwrap();
        let second_room = match rx_a.recv().await.unwrap() {
            SessionEvent::Matched { room_id, partner } => {
                assert_eq!(partner, c);
                room_id
            }
            other => panic!("unexpected event: {:?}", other),
        };
        assert_ne!(first_room, second_room);
        assert!(matches!(
            rx_c.recv().await.unwrap(),
            SessionEvent::Matched { .. }
        ));
    }

    #[tokio::test]
    async fn test_report_is_state_independent() {
        let (_, controller) = setup();
        let a = UserId::new();
        let stranger = UserId::new();
        let _rx = controller.attach(a);

        // Idle, no room, reported user never attached: still permitted
        controller.report(a, stranger, "abusive language").unwrap();
        assert_eq!(controller.inner.reports.len(), 1);
        let report = &controller.inner.reports.snapshot()[0];
        assert_eq!(report.reporter_id, a);
        assert_eq!(report.reported_id, stranger);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_releases_everything() {
        let (_, controller) = setup();
        let a = UserId::new();
        let _rx = controller.attach(a);

        controller.start_search(a).unwrap();
        controller.detach(a);

        assert!(controller.status(a).is_none());
        assert!(controller.inner.matchmaker.pool().is_empty());
        assert!(matches!(
            controller.start_search(a),
            Err(AppError::NotAuthenticated)
        ));
    }
}
