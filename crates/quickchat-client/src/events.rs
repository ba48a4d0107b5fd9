//! Events pushed to the embedding surface.
//!
//! The client broadcasts [`ClientEvent`]s over a tokio broadcast channel;
//! the embedding shell subscribes through `ChatClient::subscribe` and
//! reacts.  Payloads serialize with a kebab-case `type` tag so a JS shell
//! can switch on `event.type` directly.

use serde::Serialize;

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A transient user-facing notice (toast).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// What the embedding surface needs to react to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// The merged timeline changed; pull the new snapshot and re-render.
    MessagesUpdated {
        added: usize,
        replaced: usize,
        removed: usize,
    },
    /// The local history was wiped.
    HistoryCleared,
    /// A transient notice to show the user.
    Notice(Notice),
    /// Polling lost or regained the server.
    SyncChanged {
        connected: bool,
        consecutive_failures: u32,
    },
    /// The server no longer recognises the session; show the login view.
    SessionExpired,
    /// The session ended, here or in another instance.
    LoggedOut,
}
