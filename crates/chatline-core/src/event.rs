//! Chat events and the identifiers that order them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, transport-assigned session identifier.
///
/// Ordering follows assignment order, which is also registry iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Position of an event in the message log. Starts at 0 and never repeats.
pub type Sequence = u64;

/// What an event means. Never inferred from its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A message written by a user.
    #[serde(rename = "regular")]
    Chat,
    SystemJoin,
    SystemLeave,
}

impl EventKind {
    pub fn is_system(self) -> bool {
        !matches!(self, EventKind::Chat)
    }
}

/// A single entry of the chat history. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    pub content: String,
    pub nickname: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl ChatEvent {
    pub fn chat(nickname: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            nickname: Some(nickname.into()),
            timestamp: Utc::now(),
            kind: EventKind::Chat,
        }
    }

    pub fn joined(nickname: &str) -> Self {
        Self {
            content: format!("{nickname} joined the chat!"),
            nickname: Some(nickname.to_string()),
            timestamp: Utc::now(),
            kind: EventKind::SystemJoin,
        }
    }

    pub fn left(nickname: &str) -> Self {
        Self {
            content: format!("{nickname} left the chat!"),
            nickname: Some(nickname.to_string()),
            timestamp: Utc::now(),
            kind: EventKind::SystemLeave,
        }
    }

    /// Text shown to live recipients.
    ///
    /// System events are pre-formatted; chat events are prefixed with the sender.
    pub fn render(&self) -> String {
        match (self.kind, &self.nickname) {
            (EventKind::Chat, Some(nickname)) => format!("{nickname}: {}", self.content),
            _ => self.content.clone(),
        }
    }
}

/// A chat event together with its log position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedEvent {
    pub seq: Sequence,
    pub event: ChatEvent,
}
