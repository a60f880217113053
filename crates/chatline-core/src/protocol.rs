//! Wire messages exchanged with chat clients.
//!
//! Every frame is `{"event": "<name>", "data": {...}}`.

use crate::event::{ChatEvent, EventKind};
use crate::log::Snapshot;
use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages sent from client to server.
///
/// A missing `data` object, or missing fields inside it, read as empty
/// strings, so a bare `{"event": "set_nickname"}` is a request for the empty
/// nickname rather than a parse error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    SetNickname { nickname: String },
    Message { message: String },
    /// Ask for the current roster.
    GetUsers,
}

#[derive(Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct NicknameData {
    nickname: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct MessageData {
    message: String,
}

impl TryFrom<Frame> for ClientEvent {
    type Error = String;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        let data = match frame.data {
            Value::Null => Value::Object(Default::default()),
            data => data,
        };
        match frame.event.as_str() {
            "set_nickname" => serde_json::from_value::<NicknameData>(data)
                .map(|d| ClientEvent::SetNickname {
                    nickname: d.nickname,
                })
                .map_err(|e| e.to_string()),
            "message" => serde_json::from_value::<MessageData>(data)
                .map(|d| ClientEvent::Message { message: d.message })
                .map_err(|e| e.to_string()),
            "get_users" => Ok(ClientEvent::GetUsers),
            other => Err(format!("unknown event `{other}`")),
        }
    }
}

impl<'de> Deserialize<'de> for ClientEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Frame::deserialize(deserializer)?
            .try_into()
            .map_err(de::Error::custom)
    }
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    NicknameSet {
        nickname: String,
        existing_users: Vec<String>,
    },
    MessageHistory {
        messages: Vec<HistoryEntry>,
    },
    Message {
        msg: String,
    },
    Status {
        msg: String,
    },
    Error {
        msg: String,
    },
    UsersList {
        users: Vec<String>,
    },
}

impl ServerEvent {
    pub fn status(msg: impl Into<String>) -> Self {
        ServerEvent::Status { msg: msg.into() }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        ServerEvent::Error { msg: msg.into() }
    }

    /// Live delivery of a freshly appended event.
    pub fn live(event: &ChatEvent) -> Self {
        ServerEvent::Message {
            msg: event.render(),
        }
    }

    pub fn history(snapshot: &Snapshot) -> Self {
        ServerEvent::MessageHistory {
            messages: snapshot.events().map(HistoryEntry::from).collect(),
        }
    }
}

/// One history row: `[content, nickname, timestamp, message_type]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry(
    pub String,
    pub Option<String>,
    pub DateTime<Utc>,
    pub EventKind,
);

impl From<&ChatEvent> for HistoryEntry {
    fn from(ev: &ChatEvent) -> Self {
        HistoryEntry(
            ev.content.clone(),
            ev.nickname.clone(),
            ev.timestamp,
            ev.kind,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_client_events() {
        let ev: ClientEvent =
            serde_json::from_str(r#"{"event":"set_nickname","data":{"nickname":"alice"}}"#)
                .unwrap();
        assert_eq!(
            ev,
            ClientEvent::SetNickname {
                nickname: "alice".into()
            }
        );

        let ev: ClientEvent = serde_json::from_str(r#"{"event":"get_users"}"#).unwrap();
        assert_eq!(ev, ClientEvent::GetUsers);

        let ev: ClientEvent = serde_json::from_str(r#"{"event":"message","data":{}}"#).unwrap();
        assert_eq!(
            ev,
            ClientEvent::Message {
                message: String::new()
            }
        );
    }

    #[test]
    fn missing_or_empty_data() {
        let ev: ClientEvent =
            serde_json::from_str(r#"{"event":"get_users","data":{}}"#).unwrap();
        assert_eq!(ev, ClientEvent::GetUsers);

        let ev: ClientEvent = serde_json::from_str(r#"{"event":"set_nickname"}"#).unwrap();
        assert_eq!(
            ev,
            ClientEvent::SetNickname {
                nickname: String::new()
            }
        );

        let ev: ClientEvent =
            serde_json::from_str(r#"{"event":"message","data":null}"#).unwrap();
        assert_eq!(
            ev,
            ClientEvent::Message {
                message: String::new()
            }
        );
    }

    #[test]
    fn rejects_unknown_or_mistyped() {
        let err = serde_json::from_str::<ClientEvent>(r#"{"event":"shout","data":{}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("unknown event `shout`"));

        assert!(
            serde_json::from_str::<ClientEvent>(r#"{"event":"message","data":{"message":5}}"#)
                .is_err()
        );
        assert!(serde_json::from_str::<ClientEvent>(r#"{"data":{}}"#).is_err());
    }

    #[test]
    fn client_events_survive_the_wire() {
        for ev in [
            ClientEvent::SetNickname {
                nickname: "alice".into(),
            },
            ClientEvent::Message {
                message: "hi".into(),
            },
            ClientEvent::GetUsers,
        ] {
            let text = serde_json::to_string(&ev).unwrap();
            assert_eq!(serde_json::from_str::<ClientEvent>(&text).unwrap(), ev);
        }
    }

    #[test]
    fn history_rows_are_arrays() {
        let mut ev = ChatEvent::chat("alice", "hi");
        ev.timestamp = DateTime::parse_from_rfc3339("2024-05-01T13:05:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let value = serde_json::to_value(ServerEvent::MessageHistory {
            messages: vec![HistoryEntry::from(&ev)],
        })
        .unwrap();

        assert_eq!(
            value,
            json!({
                "event": "message_history",
                "data": {"messages": [["hi", "alice", "2024-05-01T13:05:00Z", "regular"]]}
            })
        );
    }

    #[test]
    fn nickname_set_shape() {
        let value = serde_json::to_value(ServerEvent::NicknameSet {
            nickname: "bob".into(),
            existing_users: vec!["alice".into()],
        })
        .unwrap();
        assert_eq!(
            value,
            json!({"event": "nickname_set", "data": {"nickname": "bob", "existing_users": ["alice"]}})
        );
    }
}
