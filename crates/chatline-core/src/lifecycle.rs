//! Session lifecycle: connect, join, chat, leave.
//!
//! ```text
//! Connecting -> AwaitingNickname -> Active -> Disconnected
//!                   ^        |
//!                   +--------+  (nickname rejected)
//! ```
//!
//! Join order is fixed: the `system_join` event is published to the sessions
//! that are already active, then the joiner receives the history snapshot
//! (which therefore ends with its own join), and only then does it become
//! active. The joiner never sees its own join as a live message.
//!
//! A session whose outbound queue overflows is unregistered before the call
//! that overflowed it returns, so it leaves the roster even if its transport
//! is stuck writing to the socket.

use crate::config::{CoreConfig, MIN_OUTBOUND_BUFFER};
use crate::event::{ChatEvent, SessionId};
use crate::log::MessageLog;
use crate::nickname::{NicknameAllocator, NicknameError};
use crate::protocol::{ClientEvent, ServerEvent};
use crate::registry::{ConnectionRegistry, Departure, Outbox, Session, SessionState};
use crate::router::{BroadcastRouter, ReplayError};

pub const CONNECTED_STATUS: &str = "Connected to server. Please enter your nickname.";

/// Why a client request was refused. Scoped to one session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Nickname(#[from] NicknameError),
    #[error("Please set your nickname first")]
    NotReady,
    #[error("Nickname already set")]
    AlreadyJoined,
    #[error("unknown session {0}")]
    UnknownSession(SessionId),
    #[error(transparent)]
    Replay(#[from] ReplayError),
}

/// What the transport should do after a request was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The session just became active.
    Joined,
    /// The session left; close the transport.
    Close,
}

/// Owns every piece of shared chat state. All mutation goes through `&mut self`,
/// so wrapping it in one lock gives the single-writer discipline.
#[derive(Debug)]
pub struct SessionManager {
    registry: ConnectionRegistry,
    nicknames: NicknameAllocator,
    router: BroadcastRouter,
    outbound_buffer: usize,
}

impl SessionManager {
    pub fn new(config: &CoreConfig) -> Self {
        Self::from_parts(
            ConnectionRegistry::new(),
            NicknameAllocator::new(config.case_policy),
            BroadcastRouter::new(MessageLog::new(config.retention())),
            config.outbound_buffer,
        )
    }

    /// `outbound_buffer` is raised to [`MIN_OUTBOUND_BUFFER`] if smaller.
    pub fn from_parts(
        registry: ConnectionRegistry,
        nicknames: NicknameAllocator,
        router: BroadcastRouter,
        outbound_buffer: usize,
    ) -> Self {
        Self {
            registry,
            nicknames,
            router,
            outbound_buffer: outbound_buffer.max(MIN_OUTBOUND_BUFFER),
        }
    }

    /// Queue capacity to use for [`Outbox::channel`].
    pub fn outbound_buffer(&self) -> usize {
        self.outbound_buffer
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn log(&self) -> &MessageLog {
        self.router.log()
    }

    pub fn state(&self, id: SessionId) -> Option<SessionState> {
        self.registry.get(id).map(Session::state)
    }

    /// A transport accepted a connection.
    pub fn connect(&mut self, id: SessionId, outbox: Outbox) {
        tracing::debug!(session = %id, "session connecting");
        self.registry.register(Session::new(id, outbox));
    }

    /// The transport handshake finished; the session may now pick a nickname.
    pub fn handshake_complete(&mut self, id: SessionId) -> Result<(), SessionError> {
        let session = self.session_mut(id)?;
        if session.state() != SessionState::Connecting {
            return Err(SessionError::NotReady);
        }
        session.set_state(SessionState::AwaitingNickname);
        session.deliver(ServerEvent::status(CONNECTED_STATUS));
        Ok(())
    }

    /// Dispatch one client request.
    ///
    /// Refusals are reported to the session as an `error` event and returned.
    pub fn handle(&mut self, id: SessionId, event: ClientEvent) -> Result<Flow, SessionError> {
        let result = match event {
            ClientEvent::SetNickname { nickname } => self.set_nickname(id, &nickname),
            ClientEvent::Message { message } => self.send_message(id, &message),
            ClientEvent::GetUsers => self.list_users(id),
        };
        if let Err(err) = &result {
            self.report(id, err);
        }
        self.reap_lagging();
        result
    }

    /// Assign a nickname and activate the session.
    pub fn set_nickname(&mut self, id: SessionId, requested: &str) -> Result<Flow, SessionError> {
        match self.session_mut(id)?.state() {
            SessionState::AwaitingNickname => {}
            SessionState::Active => return Err(SessionError::AlreadyJoined),
            SessionState::Connecting | SessionState::Disconnected => {
                return Err(SessionError::NotReady);
            }
        }

        let assignment = self.nicknames.assign(requested, id)?;
        let nickname = assignment.nickname;

        self.router
            .publish(ChatEvent::joined(&nickname), &mut self.registry);

        let session = self
            .registry
            .get_mut(id)
            .ok_or(SessionError::UnknownSession(id))?;
        session.set_nickname(nickname.clone());
        session.deliver(ServerEvent::NicknameSet {
            nickname: nickname.clone(),
            existing_users: assignment.existing,
        });
        let replayed = self.router.replay_history(session)?;
        session.deliver(ServerEvent::status(format!("Welcome, {nickname}!")));
        session.set_state(SessionState::Active);

        tracing::info!(session = %id, %nickname, replayed, "joined");
        self.broadcast_roster();
        self.reap_lagging();
        Ok(Flow::Joined)
    }

    /// Publish a chat message from an active session.
    ///
    /// Blank messages are dropped; `quit` leaves the chat.
    pub fn send_message(&mut self, id: SessionId, text: &str) -> Result<Flow, SessionError> {
        let session = self.session_mut(id)?;
        if !session.is_active() {
            return Err(SessionError::NotReady);
        }
        let Some(nickname) = session.nickname().map(str::to_string) else {
            return Err(SessionError::NotReady);
        };

        let text = text.trim();
        if text.is_empty() {
            return Ok(Flow::Continue);
        }
        if text.eq_ignore_ascii_case("quit") {
            self.disconnect(id);
            return Ok(Flow::Close);
        }

        self.router
            .publish(ChatEvent::chat(nickname, text), &mut self.registry);
        self.reap_lagging();
        Ok(Flow::Continue)
    }

    /// Send the current roster to one active session.
    pub fn list_users(&mut self, id: SessionId) -> Result<Flow, SessionError> {
        let users = self.registry.active_nicknames();
        let session = self.session_mut(id)?;
        if !session.is_active() {
            return Err(SessionError::NotReady);
        }
        session.deliver(ServerEvent::UsersList { users });
        Ok(Flow::Continue)
    }

    /// The transport closed or the client asked to leave.
    ///
    /// Idempotent: a second call for the same session does nothing.
    pub fn disconnect(&mut self, id: SessionId) -> Option<Departure> {
        let departure = self.depart(id);
        self.reap_lagging();
        departure
    }

    /// Unregister every session whose outbound queue has been closed.
    ///
    /// Each leave event may overflow further queues, so repeat until none are left.
    fn reap_lagging(&mut self) {
        loop {
            let lagging = self.registry.lagging();
            if lagging.is_empty() {
                return;
            }
            for id in lagging {
                tracing::warn!(session = %id, "disconnecting slow session");
                self.depart(id);
            }
        }
    }

    fn depart(&mut self, id: SessionId) -> Option<Departure> {
        let departure = self
            .registry
            .unregister(id, &mut self.nicknames, &mut self.router)?;
        if departure.announced {
            tracing::info!(session = %id, nickname = ?departure.nickname, "left");
            self.broadcast_roster();
        } else {
            tracing::debug!(session = %id, "session dropped before joining");
        }
        Some(departure)
    }

    fn broadcast_roster(&mut self) {
        let users = self.registry.active_nicknames();
        self.router
            .notify_all(&ServerEvent::UsersList { users }, &mut self.registry);
    }

    fn report(&mut self, id: SessionId, err: &SessionError) {
        tracing::debug!(session = %id, error = %err, "request refused");
        if let Some(session) = self.registry.get_mut(id) {
            session.deliver(ServerEvent::error(err.to_string()));
        }
    }

    fn session_mut(&mut self, id: SessionId) -> Result<&mut Session, SessionError> {
        self.registry
            .get_mut(id)
            .ok_or(SessionError::UnknownSession(id))
    }
}
