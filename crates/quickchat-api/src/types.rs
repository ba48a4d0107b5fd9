//! Wire-level response shapes.

use serde::{Deserialize, Serialize};

use quickchat_shared::User;

/// The envelope every endpoint answers with.
///
/// `data` carries the payload on success, `error` a human-readable reason
/// on failure.  Either way the server may rotate the CSRF token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub csrf_token: Option<String>,
}

/// Payload of `auth.php` responses.
///
/// `authenticated: false` with `success: true` is a normal answer to a
/// session check, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub authenticated: bool,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub csrf_token: Option<String>,
}
