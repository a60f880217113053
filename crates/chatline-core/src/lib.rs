//! Core of a real-time chat server.
//!
//! This crate owns the chat state: who is connected, which nicknames are held,
//! the ordered message history, and the fan-out of new events. It performs no
//! I/O; a transport feeds it [`ClientEvent`]s and drains each session's
//! [`ServerEvent`] queue.

mod config;
mod event;
mod lifecycle;
mod log;
mod nickname;
mod protocol;
mod registry;
mod router;

pub use config::{
    CoreConfig, DEFAULT_MAX_HISTORY, DEFAULT_OUTBOUND_BUFFER, InvalidConfig, MIN_OUTBOUND_BUFFER,
};
pub use event::{ChatEvent, EventKind, LoggedEvent, Sequence, SessionId};
pub use lifecycle::{CONNECTED_STATUS, Flow, SessionError, SessionManager};
pub use log::{MessageLog, Retention, Snapshot};
pub use nickname::{Assignment, CasePolicy, NicknameAllocator, NicknameError};
pub use protocol::{ClientEvent, HistoryEntry, ServerEvent};
pub use registry::{ConnectionRegistry, Delivery, Departure, Outbox, Session, SessionState};
pub use router::{BroadcastRouter, Fanout, ReplayError};
