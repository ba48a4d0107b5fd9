//! The persisted unit of per-user chat history.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Message;

/// Snapshot of one user's message history plus the polling cursor.
///
/// Exactly one envelope is persisted per user id.  It is rewritten after
/// every successful poll, send, or upload, and swept at startup once it is
/// older than the retention window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEnvelope {
    /// Ordered, deduplicated message snapshot.
    pub messages: Vec<Message>,
    /// Highest server-confirmed message id; the `after_id` fetch cursor.
    pub last_message_id: Option<i64>,
    /// When this envelope was written.
    pub timestamp: DateTime<Utc>,
    /// Owner.  An envelope loaded for a different user is treated as absent.
    pub user_id: i64,
    /// Owner's name at write time, kept for session-recovery display.
    pub username: String,
}

impl CacheEnvelope {
    /// Build an envelope from the current message list.
    ///
    /// The cursor is recomputed as the highest server id in `messages`;
    /// temporary local ids never advance it.
    pub fn new(user_id: i64, username: &str, messages: Vec<Message>) -> Self {
        let last_message_id = highest_server_id(&messages);
        Self {
            messages,
            last_message_id,
            timestamp: Utc::now(),
            user_id,
            username: username.to_string(),
        }
    }

    /// Whether this envelope belongs to `user_id`.
    pub fn belongs_to(&self, user_id: i64) -> bool {
        self.user_id == user_id
    }

    /// Whether the envelope was written longer than `max_age` before `now`.
    pub fn is_stale(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.timestamp) > max_age
    }
}

/// Highest server-confirmed id in a message list, if any.
pub fn highest_server_id(messages: &[Message]) -> Option<i64> {
    messages.iter().filter_map(|m| m.id.server_id()).max()
}
