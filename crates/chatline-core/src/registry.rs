//! Connected sessions and their outbound queues.

use crate::event::{ChatEvent, SessionId};
use crate::nickname::NicknameAllocator;
use crate::protocol::ServerEvent;
use crate::router::BroadcastRouter;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport accepted, handshake still running.
    Connecting,
    /// Handshake done, no nickname yet.
    AwaitingNickname,
    /// Nickname assigned and history replayed.
    Active,
    Disconnected,
}

/// Result of handing one event to a session's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// The queue was full; the outbox is now closed.
    Overflowed,
    /// The outbox was already closed.
    Closed,
}

/// Bounded outbound queue of one session.
///
/// Slow consumers are cut off: the first send that finds the queue full
/// closes the outbox. The session is then unregistered by its manager and the
/// transport sees the receiver end.
#[derive(Debug)]
pub struct Outbox {
    tx: Option<mpsc::Sender<ServerEvent>>,
}

impl Outbox {
    pub fn new(tx: mpsc::Sender<ServerEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Create an outbox and the receiver the transport drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    pub fn deliver(&mut self, event: ServerEvent) -> Delivery {
        let Some(tx) = &self.tx else {
            return Delivery::Closed;
        };
        match tx.try_send(event) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => {
                self.tx = None;
                Delivery::Overflowed
            }
            Err(TrySendError::Closed(_)) => {
                self.tx = None;
                Delivery::Closed
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().is_none_or(|tx| tx.is_closed())
    }
}

/// A transport session as seen by the core.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    nickname: Option<String>,
    state: SessionState,
    replayed: bool,
    outbox: Outbox,
}

impl Session {
    pub fn new(id: SessionId, outbox: Outbox) -> Self {
        Self {
            id,
            nickname: None,
            state: SessionState::Connecting,
            replayed: false,
            outbox,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn nickname(&self) -> Option<&str> {
        self.nickname.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn has_replayed(&self) -> bool {
        self.replayed
    }

    /// Queue an event for this session. A no-op once disconnected.
    pub fn deliver(&mut self, event: ServerEvent) -> Delivery {
        if self.state == SessionState::Disconnected {
            return Delivery::Closed;
        }
        let delivery = self.outbox.deliver(event);
        if delivery == Delivery::Overflowed {
            tracing::warn!(session = %self.id, "outbound queue full, dropping session");
        }
        delivery
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    /// Nicknames are set once per session lifetime.
    pub(crate) fn set_nickname(&mut self, nickname: String) {
        if self.nickname.is_none() {
            self.nickname = Some(nickname);
        }
    }

    pub(crate) fn mark_replayed(&mut self) {
        self.replayed = true;
    }
}

/// What remains of a session after it is unregistered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub id: SessionId,
    pub nickname: Option<String>,
    /// Whether a leave event was published for it.
    pub announced: bool,
}

/// Every live session, iterated in id order.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: BTreeMap<SessionId, Session>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new session. A session with the same id is replaced.
    pub fn register(&mut self, session: Session) {
        let id = session.id();
        if self.sessions.insert(id, session).is_some() {
            tracing::warn!(session = %id, "session id reused, replacing stale entry");
        }
    }

    /// Forget a session.
    ///
    /// Releases its nickname and, if it had joined, publishes exactly one
    /// leave event to the remaining active sessions. Unknown ids are ignored.
    pub fn unregister(
        &mut self,
        id: SessionId,
        nicknames: &mut NicknameAllocator,
        router: &mut BroadcastRouter,
    ) -> Option<Departure> {
        let mut session = self.sessions.remove(&id)?;
        let was_active = session.is_active();
        session.set_state(SessionState::Disconnected);
        nicknames.release(id);

        let announced = match (&session.nickname, was_active) {
            (Some(nickname), true) => {
                router.publish(ChatEvent::left(nickname), self);
                true
            }
            _ => false,
        };

        Some(Departure {
            id,
            nickname: session.nickname,
            announced,
        })
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    /// Sessions that have completed nickname assignment.
    pub fn list_active(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values().filter(|s| s.is_active())
    }

    pub(crate) fn active_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.values_mut().filter(|s| s.is_active())
    }

    /// Nicknames of active sessions, in session order.
    pub fn active_nicknames(&self) -> Vec<String> {
        self.list_active()
            .filter_map(|s| s.nickname().map(str::to_string))
            .collect()
    }

    /// Ids of sessions whose outbox has been closed.
    pub(crate) fn lagging(&self) -> Vec<SessionId> {
        self.sessions
            .values()
            .filter(|s| s.outbox.is_closed())
            .map(|s| s.id())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
