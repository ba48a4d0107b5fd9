//! The seam between client logic and the HTTP transport.

use async_trait::async_trait;

use quickchat_api::{ApiClient, ApiError, SessionState};
use quickchat_shared::{Group, Message, MessageId, Reaction, User};

/// Server operations as the client consumes them.
///
/// [`ApiClient`] is the production implementation; tests substitute a
/// scripted double so polling and send flows run against canned responses.
#[async_trait]
pub trait ChatApi: Send + Sync + 'static {
    async fn login(&self, username: &str, password: &str) -> Result<SessionState, ApiError>;
    async fn check_session(&self) -> Result<SessionState, ApiError>;
    async fn logout(&self) -> Result<(), ApiError>;
    async fn fetch_messages(
        &self,
        after_id: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Message>, ApiError>;
    async fn send_message(&self, content: &str) -> Result<Message, ApiError>;
    async fn upload_file(&self, file_name: &str, bytes: Vec<u8>) -> Result<Message, ApiError>;
    async fn toggle_reaction(
        &self,
        message_id: &MessageId,
        emoji: &str,
    ) -> Result<Vec<Reaction>, ApiError>;
    async fn list_users(&self) -> Result<Vec<User>, ApiError>;
    async fn list_groups(&self) -> Result<Vec<Group>, ApiError>;
}

#[async_trait]
impl ChatApi for ApiClient {
    async fn login(&self, username: &str, password: &str) -> Result<SessionState, ApiError> {
        ApiClient::login(self, username, password).await
    }

    async fn check_session(&self) -> Result<SessionState, ApiError> {
        ApiClient::check_session(self).await
    }

    async fn logout(&self) -> Result<(), ApiError> {
        ApiClient::logout(self).await
    }

    async fn fetch_messages(
        &self,
        after_id: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Message>, ApiError> {
        ApiClient::fetch_messages(self, after_id, limit).await
    }

    async fn send_message(&self, content: &str) -> Result<Message, ApiError> {
        ApiClient::send_message(self, content).await
    }

    async fn upload_file(&self, file_name: &str, bytes: Vec<u8>) -> Result<Message, ApiError> {
        ApiClient::upload_file(self, file_name, bytes).await
    }

    async fn toggle_reaction(
        &self,
        message_id: &MessageId,
        emoji: &str,
    ) -> Result<Vec<Reaction>, ApiError> {
        ApiClient::toggle_reaction(self, message_id, emoji).await
    }

    async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        ApiClient::list_users(self).await
    }

    async fn list_groups(&self) -> Result<Vec<Group>, ApiError> {
        ApiClient::list_groups(self).await
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    //! Scripted [`ChatApi`] double shared by the poller and client tests.

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use quickchat_api::{ApiError, SessionState};
    use quickchat_shared::{Group, Message, MessageId, MessageType, Reaction, User};

    use super::ChatApi;

    pub fn test_user(id: i64, username: &str) -> User {
        User {
            id,
            username: username.to_string(),
            is_online: true,
            last_seen: None,
        }
    }

    /// A server-confirmed message with a fixed id, for seeding histories.
    pub fn history_message(user: &User, id: i64, content: &str) -> Message {
        Message {
            id: MessageId::Server(id),
            user_id: user.id,
            username: user.username.clone(),
            content: content.to_string(),
            message_type: MessageType::Text,
            created_at: Utc::now(),
            edited_at: None,
            reactions: Vec::new(),
            is_local: false,
        }
    }

    /// Queue responses up front, inspect the recorded calls afterwards.
    ///
    /// An exhausted queue yields a benign default (empty fetch, confirmed
    /// send, live session), so long-running poller tests only script the
    /// interesting ticks.
    pub struct ScriptedApi {
        user: User,
        next_id: AtomicI64,
        fetches: Mutex<VecDeque<Result<Vec<Message>, ApiError>>>,
        fetch_cursors: Mutex<Vec<Option<i64>>>,
        send_failures: Mutex<VecDeque<ApiError>>,
        sent: Mutex<Vec<String>>,
        sessions: Mutex<VecDeque<Result<SessionState, ApiError>>>,
        upload_failures: Mutex<VecDeque<ApiError>>,
        logouts: AtomicUsize,
    }

    impl ScriptedApi {
        pub fn new(user: User) -> Self {
            Self {
                user,
                // Ids minted for confirmed sends start well above any
                // scripted history id.
                next_id: AtomicI64::new(100),
                fetches: Mutex::new(VecDeque::new()),
                fetch_cursors: Mutex::new(Vec::new()),
                send_failures: Mutex::new(VecDeque::new()),
                sent: Mutex::new(Vec::new()),
                sessions: Mutex::new(VecDeque::new()),
                upload_failures: Mutex::new(VecDeque::new()),
                logouts: AtomicUsize::new(0),
            }
        }

        pub fn push_fetch(&self, result: Result<Vec<Message>, ApiError>) {
            self.fetches.lock().unwrap().push_back(result);
        }

        pub fn push_send_failure(&self, err: ApiError) {
            self.send_failures.lock().unwrap().push_back(err);
        }

        pub fn push_session(&self, result: Result<SessionState, ApiError>) {
            self.sessions.lock().unwrap().push_back(result);
        }

        pub fn push_upload_failure(&self, err: ApiError) {
            self.upload_failures.lock().unwrap().push_back(err);
        }

        pub fn fetch_count(&self) -> usize {
            self.fetch_cursors.lock().unwrap().len()
        }

        /// The `after_id` of every fetch, in call order.
        pub fn fetch_cursors(&self) -> Vec<Option<i64>> {
            self.fetch_cursors.lock().unwrap().clone()
        }

        /// Contents the server accepted, in call order.
        pub fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }

        pub fn logout_count(&self) -> usize {
            self.logouts.load(Ordering::SeqCst)
        }

        /// A server-confirmed message with the next minted id.
        pub fn server_message(&self, content: &str) -> Message {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            history_message(&self.user, id, content)
        }

        fn live_session(&self) -> SessionState {
            SessionState {
                authenticated: true,
                user: Some(self.user.clone()),
                csrf_token: Some("tok-test".to_string()),
            }
        }
    }

    #[async_trait]
    impl ChatApi for ScriptedApi {
        async fn login(&self, _username: &str, _password: &str) -> Result<SessionState, ApiError> {
            Ok(self.live_session())
        }

        async fn check_session(&self) -> Result<SessionState, ApiError> {
            match self.sessions.lock().unwrap().pop_front() {
                Some(result) => result,
                None => Ok(self.live_session()),
            }
        }

        async fn logout(&self) -> Result<(), ApiError> {
            self.logouts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn fetch_messages(
            &self,
            after_id: Option<i64>,
            _limit: u32,
        ) -> Result<Vec<Message>, ApiError> {
            self.fetch_cursors.lock().unwrap().push(after_id);
            match self.fetches.lock().unwrap().pop_front() {
                Some(result) => result,
                None => Ok(Vec::new()),
            }
        }

        async fn send_message(&self, content: &str) -> Result<Message, ApiError> {
            if let Some(err) = self.send_failures.lock().unwrap().pop_front() {
                return Err(err);
            }
            self.sent.lock().unwrap().push(content.to_string());
            Ok(self.server_message(content))
        }

        async fn upload_file(&self, file_name: &str, _bytes: Vec<u8>) -> Result<Message, ApiError> {
            if let Some(err) = self.upload_failures.lock().unwrap().pop_front() {
                return Err(err);
            }
            let mut message = self.server_message(&format!("uploads/{file_name}"));
            message.message_type = MessageType::File;
            Ok(message)
        }

        async fn toggle_reaction(
            &self,
            _message_id: &MessageId,
            emoji: &str,
        ) -> Result<Vec<Reaction>, ApiError> {
            Ok(vec![Reaction {
                emoji: emoji.to_string(),
                count: 1,
                user_ids: vec![self.user.id],
            }])
        }

        async fn list_users(&self) -> Result<Vec<User>, ApiError> {
            Ok(vec![self.user.clone()])
        }

        async fn list_groups(&self) -> Result<Vec<Group>, ApiError> {
            Ok(Vec::new())
        }
    }
}
