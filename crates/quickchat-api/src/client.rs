//! The typed API surface.
//!
//! One [`ApiClient`] per server.  The reqwest client keeps the session
//! cookie; the CSRF token lives beside it and is rotated whenever the
//! server hands out a new one.  Every operation returns the payload type
//! directly and funnels failures through [`ApiError`].

use std::sync::RwLock;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::json;

use quickchat_shared::{Group, Message, MessageId, Reaction, User};

use crate::error::{ApiError, Result};
use crate::types::{ApiEnvelope, SessionState};

const AUTH_ENDPOINT: &str = "auth.php";
const MESSAGES_ENDPOINT: &str = "messages.php";
const USERS_ENDPOINT: &str = "users.php";
const GROUPS_ENDPOINT: &str = "groups.php";
const REACTIONS_ENDPOINT: &str = "reactions.php";

/// Header carrying the anti-forgery token on mutating requests.
const CSRF_HEADER: &str = "X-CSRF-Token";

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    csrf: RwLock<Option<String>>,
}

impl ApiClient {
    /// Build a client for `base_url` (with or without a trailing slash).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            csrf: RwLock::new(None),
        })
    }

    // ---------------------------------------------------------------
    // Auth
    // ---------------------------------------------------------------

    /// Establish a session.  The caller decides what a non-authenticated
    /// answer means; credential rejections arrive as [`ApiError::Api`].
    pub async fn login(&self, username: &str, password: &str) -> Result<SessionState> {
        let resp = self
            .post_json(
                AUTH_ENDPOINT,
                &json!({
                    "action": "login",
                    "username": username,
                    "password": password,
                }),
            )
            .await?;

        let session: SessionState = self.require(Self::decode(resp).await?)?;
        self.adopt_csrf(session.csrf_token.clone());
        Ok(session)
    }

    /// Ask whether the stored cookie still names a live session.
    pub async fn check_session(&self) -> Result<SessionState> {
        let resp = self
            .http
            .get(self.url(AUTH_ENDPOINT))
            .query(&[("action", "check_session")])
            .send()
            .await?;

        let session: SessionState = self.require(Self::decode(resp).await?)?;
        self.adopt_csrf(session.csrf_token.clone());
        Ok(session)
    }

    pub async fn logout(&self) -> Result<()> {
        let resp = self
            .post_json(AUTH_ENDPOINT, &json!({ "action": "logout" }))
            .await?;
        let _: Option<serde_json::Value> = self.accept(Self::decode(resp).await?)?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Messages
    // ---------------------------------------------------------------

    /// Fetch up to `limit` messages, newer than `after_id` when given.
    pub async fn fetch_messages(&self, after_id: Option<i64>, limit: u32) -> Result<Vec<Message>> {
        let mut query: Vec<(&str, String)> = vec![
            ("action", "list".to_owned()),
            ("limit", limit.to_string()),
        ];
        if let Some(after_id) = after_id {
            query.push(("after_id", after_id.to_string()));
        }

        tracing::debug!(?after_id, limit, "fetching messages");

        let resp = self
            .http
            .get(self.url(MESSAGES_ENDPOINT))
            .query(&query)
            .send()
            .await?;

        self.require(Self::decode(resp).await?)
    }

    /// Post a text message; the response is the authoritative record with
    /// its server-assigned id.
    pub async fn send_message(&self, content: &str) -> Result<Message> {
        let resp = self
            .post_json(
                MESSAGES_ENDPOINT,
                &json!({ "action": "send", "content": content }),
            )
            .await?;

        self.require(Self::decode(resp).await?)
    }

    /// Upload an attachment; the server answers with the message it created
    /// for it.
    pub async fn upload_file(&self, file_name: &str, bytes: Vec<u8>) -> Result<Message> {
        tracing::debug!(file_name, size = bytes.len(), "uploading file");

        let form = Form::new()
            .text("action", "upload_file")
            .part("file", Part::bytes(bytes).file_name(file_name.to_owned()));

        let mut req = self.http.post(self.url(MESSAGES_ENDPOINT)).multipart(form);
        if let Some(token) = self.csrf_token() {
            req = req.header(CSRF_HEADER, token);
        }

        let resp = req.send().await?;
        self.require(Self::decode(resp).await?)
    }

    // ---------------------------------------------------------------
    // Reactions, users, groups
    // ---------------------------------------------------------------

    /// Toggle `emoji` on a message; returns the message's updated reaction
    /// list.
    pub async fn toggle_reaction(
        &self,
        message_id: &MessageId,
        emoji: &str,
    ) -> Result<Vec<Reaction>> {
        let resp = self
            .post_json(
                REACTIONS_ENDPOINT,
                &json!({
                    "action": "toggle",
                    "message_id": message_id,
                    "emoji": emoji,
                }),
            )
            .await?;

        self.require(Self::decode(resp).await?)
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let resp = self
            .http
            .get(self.url(USERS_ENDPOINT))
            .query(&[("action", "list")])
            .send()
            .await?;

        self.require(Self::decode(resp).await?)
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>> {
        let resp = self
            .http
            .get(self.url(GROUPS_ENDPOINT))
            .query(&[("action", "list")])
            .send()
            .await?;

        self.require(Self::decode(resp).await?)
    }

    // ---------------------------------------------------------------
    // Plumbing
    // ---------------------------------------------------------------

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    fn csrf_token(&self) -> Option<String> {
        match self.csrf.read() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        }
    }

    fn adopt_csrf(&self, token: Option<String>) {
        let Some(token) = token else { return };
        if let Ok(mut guard) = self.csrf.write() {
            *guard = Some(token);
        }
    }

    /// POST a JSON body with the CSRF header attached.
    async fn post_json(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response> {
        let mut req = self.http.post(self.url(endpoint)).json(body);
        if let Some(token) = self.csrf_token() {
            req = req.header(CSRF_HEADER, token);
        }
        Ok(req.send().await?)
    }

    /// Turn an HTTP response into a parsed envelope.
    ///
    /// The body is read as text first so a shape mismatch surfaces as
    /// [`ApiError::Decode`], distinct from transport failures.
    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<ApiEnvelope<T>> {
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::AuthRequired);
        }
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }

        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Unwrap an envelope: adopt any rotated token, then map a rejection
    /// to the right error.
    fn accept<T>(&self, envelope: ApiEnvelope<T>) -> Result<Option<T>> {
        self.adopt_csrf(envelope.csrf_token);

        if envelope.success {
            return Ok(envelope.data);
        }

        let reason = envelope
            .error
            .unwrap_or_else(|| "Request rejected".to_owned());
        if is_session_error(&reason) {
            return Err(ApiError::AuthRequired);
        }
        Err(ApiError::Api(reason))
    }

    /// [`accept`](Self::accept), but the operation's contract includes a
    /// payload.
    fn require<T>(&self, envelope: ApiEnvelope<T>) -> Result<T> {
        self.accept(envelope)?
            .ok_or_else(|| ApiError::Api("Response envelope carried no data".to_owned()))
    }
}

/// Error strings the server uses when the session is gone.  A stale CSRF
/// token counts: re-checking the session is what refreshes it.
fn is_session_error(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("session") || lower.contains("not authenticated") || lower.contains("csrf")
}
