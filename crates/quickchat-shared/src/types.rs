use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::constants::LOCAL_ID_PREFIX;

// ---------------------------------------------------------------------------
// MessageId
// ---------------------------------------------------------------------------

/// Identifier of a message.
///
/// Server-confirmed messages carry a numeric id assigned by the backend.
/// Optimistic messages carry a client-generated temporary id until the server
/// echo replaces them.  The id is the sole deduplication key everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageId {
    /// Backend-assigned identifier.
    Server(i64),
    /// Client-generated temporary identifier (`local-<uuid>`).
    Local(String),
}

impl MessageId {
    /// Mint a fresh temporary id for an optimistic message.
    pub fn new_local() -> Self {
        Self::Local(format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4()))
    }

    /// The numeric id, if server-confirmed.
    pub fn server_id(&self) -> Option<i64> {
        match self {
            Self::Server(id) => Some(*id),
            Self::Local(_) => None,
        }
    }

    /// Whether this is a temporary, not-yet-confirmed id.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server(id) => write!(f, "{id}"),
            Self::Local(id) => f.write_str(id),
        }
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self::Server(id)
    }
}

impl Serialize for MessageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Server(id) => serializer.serialize_i64(*id),
            Self::Local(id) => serializer.serialize_str(id),
        }
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(i64),
            Text(String),
        }

        // The backend is not consistent about quoting numeric ids, so a
        // numeric string is a server id too.
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Num(id) => Self::Server(id),
            Raw::Text(s) => match s.parse::<i64>() {
                Ok(id) => Self::Server(id),
                Err(_) => Self::Local(s),
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Kind of message payload; selects the render branch in the embedding UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Audio,
    File,
    Video,
}

/// An emoji reaction aggregated over the users who placed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    /// The emoji character(s).
    pub emoji: String,
    /// How many users placed this reaction.
    pub count: u32,
    /// Ids of the users who placed it, in server order.
    #[serde(default)]
    pub user_ids: Vec<i64>,
}

/// A single chat message, as fetched from the backend and as kept in the
/// local cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Deduplication key; ordering key when server-confirmed.
    pub id: MessageId,
    /// Author's user id.
    pub user_id: i64,
    /// Author's display name at send time.
    #[serde(default)]
    pub username: String,
    /// Text body, or the server-side path for media messages.
    pub content: String,
    /// Payload kind.
    #[serde(default)]
    pub message_type: MessageType,
    /// Server-assigned creation time; fallback ordering key.
    pub created_at: DateTime<Utc>,
    /// Set when the message was edited after creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
    /// Aggregated reactions, in server order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reactions: Vec<Reaction>,
    /// True for an optimistic message the server has not confirmed yet.
    /// Absent on the wire; round-trips through the local cache.
    #[serde(default)]
    pub is_local: bool,
}

impl Message {
    /// Build an optimistic text message for immediate display, pending
    /// server confirmation.
    pub fn new_local(user_id: i64, username: &str, content: &str) -> Self {
        Self {
            id: MessageId::new_local(),
            user_id,
            username: username.to_string(),
            content: content.to_string(),
            message_type: MessageType::Text,
            created_at: Utc::now(),
            edited_at: None,
            reactions: Vec::new(),
            is_local: true,
        }
    }
}

// ---------------------------------------------------------------------------
// User / Group
// ---------------------------------------------------------------------------

/// A chat participant as reported by the users endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

/// A group conversation as reported by the groups endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub member_count: u32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_accepts_number_and_numeric_string() {
        let from_num: MessageId = serde_json::from_str("57").unwrap();
        let from_str: MessageId = serde_json::from_str("\"57\"").unwrap();
        assert_eq!(from_num, MessageId::Server(57));
        assert_eq!(from_str, MessageId::Server(57));
    }

    #[test]
    fn message_id_keeps_temporary_strings_local() {
        let id: MessageId = serde_json::from_str("\"local-abc\"").unwrap();
        assert_eq!(id, MessageId::Local("local-abc".into()));
        assert!(id.is_local());
        assert_eq!(id.server_id(), None);
    }

    #[test]
    fn message_id_serializes_back_to_wire_shape() {
        assert_eq!(
            serde_json::to_string(&MessageId::Server(3)).unwrap(),
            "3"
        );
        assert_eq!(
            serde_json::to_string(&MessageId::Local("local-x".into())).unwrap(),
            "\"local-x\""
        );
    }

    #[test]
    fn message_parses_with_optional_fields_missing() {
        let json = r#"{
            "id": 1,
            "user_id": 9,
            "username": "alice",
            "content": "hi",
            "message_type": "text",
            "created_at": "2024-05-01T10:00:00Z"
        }"#;
        let m: Message = serde_json::from_str(json).unwrap();
        assert_eq!(m.id, MessageId::Server(1));
        assert_eq!(m.message_type, MessageType::Text);
        assert!(m.edited_at.is_none());
        assert!(m.reactions.is_empty());
        assert!(!m.is_local);
    }

    #[test]
    fn message_rejects_unknown_type() {
        let json = r#"{
            "id": 1,
            "user_id": 9,
            "content": "hi",
            "message_type": "hologram",
            "created_at": "2024-05-01T10:00:00Z"
        }"#;
        assert!(serde_json::from_str::<Message>(json).is_err());
    }

    #[test]
    fn new_local_messages_are_flagged_and_prefixed() {
        let m = Message::new_local(1, "alice", "draft");
        assert!(m.is_local);
        assert!(m.id.is_local());
        assert!(m.id.to_string().starts_with(crate::constants::LOCAL_ID_PREFIX));
    }
}
