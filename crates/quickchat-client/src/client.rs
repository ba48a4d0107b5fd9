//! The client facade.
//!
//! One [`ChatClient`] per window or embedding surface.  It owns the shared
//! timeline state, the HTTP transport, the local cache handle and the event
//! channel, and it starts and stops the polling task.  Every timeline
//! mutation funnels through the merge engine, so the facade never touches
//! message ordering itself.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use quickchat_api::{ApiClient, ApiError};
use quickchat_shared::{
    validate_content, validate_upload, CacheEnvelope, Group, Message, MessageId, Reaction, User,
};
use quickchat_store::EnvelopeStore;

use crate::bus::SyncBus;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::events::{ClientEvent, Notice};
use crate::poller::{spawn_poller, PollerConfig, PollerHandle};
use crate::state::{ChatState, Session, SharedState};
use crate::transport::ChatApi;

/// Capacity of the per-client event channel.  Slow subscribers lag rather
/// than block the client.
const EVENT_CAPACITY: usize = 256;

pub struct ChatClient {
    config: ClientConfig,
    api: Arc<dyn ChatApi>,
    store: Arc<dyn EnvelopeStore>,
    state: SharedState,
    bus: SyncBus,
    events: broadcast::Sender<ClientEvent>,
    poller: Option<PollerHandle>,
}

impl ChatClient {
    /// Build a client over the real HTTP transport.
    pub fn new(config: ClientConfig, store: Arc<dyn EnvelopeStore>, bus: SyncBus) -> Result<Self> {
        let api = ApiClient::new(&config.api_url, config.http_timeout)?;
        Ok(Self::with_api(Arc::new(api), config, store, bus))
    }

    /// Build a client over any transport.  Tests inject a scripted one.
    pub fn with_api(
        api: Arc<dyn ChatApi>,
        config: ClientConfig,
        store: Arc<dyn EnvelopeStore>,
        bus: SyncBus,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            api,
            store,
            state: Arc::new(Mutex::new(ChatState::new())),
            bus,
            events,
            poller: None,
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start-up sequence: sweep stale cache snapshots, then try to recover
    /// the server session.  When the server is unreachable the most recent
    /// cached snapshot stands in, so the surface still paints offline.
    pub async fn init(&self) -> Result<Option<User>> {
        let swept = self.store.sweep_stale(self.config.cache_max_age());
        if swept > 0 {
            debug!(swept, "Stale snapshots removed");
        }

        match self.check_session().await {
            Ok(user) => {
                if let Some(user) = &user {
                    info!(user_id = user.id, "Session recovered");
                }
                Ok(user)
            }
            Err(ClientError::Api(e)) if e.is_auth() => Ok(None),
            Err(ClientError::Api(e)) => {
                warn!(error = %e, "Session check failed, trying the local cache");
                self.recover_offline()
            }
            Err(e) => Err(e),
        }
    }

    /// Ask the server whether the cookie session is still live, and adopt
    /// it when it is.
    pub async fn check_session(&self) -> Result<Option<User>> {
        let session = self.api.check_session().await?;
        match session.user {
            Some(user) if session.authenticated => {
                self.adopt_session(&user)?;
                Ok(Some(user))
            }
            _ => Ok(None),
        }
    }

    /// Authenticate and adopt the returned session.
    pub async fn login(&self, username: &str, password: &str) -> Result<User> {
        let session = self.api.login(username, password).await?;
        let user = session
            .user
            .ok_or_else(|| ApiError::Api("Login response carried no user".to_owned()))?;
        info!(user_id = user.id, username = %user.username, "Logged in");
        self.adopt_session(&user)?;
        Ok(user)
    }

    /// End the session: stop polling, tell the server, drop local session
    /// state and let other instances know.  The cached snapshot survives
    /// so the next login on this device paints instantly.
    pub async fn logout(&mut self) -> Result<()> {
        let session = self.require_session()?;
        self.stop_polling().await;

        if let Err(e) = self.api.logout().await {
            warn!(error = %e, "Server logout failed, dropping the session locally");
        }

        self.lock_state()?.reset();
        self.bus.publish_logout(session.user_id);
        self.emit(ClientEvent::LoggedOut);
        info!(user_id = session.user_id, "Logged out");
        Ok(())
    }

    fn adopt_session(&self, user: &User) -> Result<()> {
        self.lock_state()?.set_session(user);
        Ok(())
    }

    /// Fall back to the most recent cached snapshot when the server cannot
    /// be reached during start-up.  The session is provisional; the next
    /// successful poll or login replaces it.
    fn recover_offline(&self) -> Result<Option<User>> {
        let Some(envelope) = self.store.read_latest() else {
            return Ok(None);
        };

        let user = User {
            id: envelope.user_id,
            username: envelope.username.clone(),
            is_online: false,
            last_seen: None,
        };

        {
            let mut state = self.lock_state()?;
            state.set_session(&user);
            state.seed(envelope.messages);
        }

        info!(user_id = user.id, "Recovered offline from the local cache");
        self.emit(ClientEvent::Notice(Notice::warning(
            "Offline: showing cached messages",
        )));
        Ok(Some(user))
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    /// History for the current user: paint from the cache first, then fetch
    /// everything after the cached cursor and merge it on top.  When the
    /// fetch fails the cached history is served as-is.
    pub async fn load_messages(&self) -> Result<Vec<Message>> {
        let session = self.require_session()?;

        let after_id = {
            let mut state = self.lock_state()?;
            if state.timeline_is_empty() {
                if let Some(envelope) = self.store.read(session.user_id) {
                    debug!(cached = envelope.messages.len(), "Seeded timeline from cache");
                    state.seed(envelope.messages);
                }
            }
            state.cursor()
        };

        let fresh = match self
            .api
            .fetch_messages(after_id, self.config.fetch_limit)
            .await
        {
            Ok(fresh) => fresh,
            Err(e) if e.is_auth() => {
                self.emit(ClientEvent::SessionExpired);
                return Err(e.into());
            }
            Err(e) => {
                warn!(error = %e, "Fetch failed, serving cached history");
                self.emit(ClientEvent::Notice(Notice::warning(
                    "Offline: showing cached messages",
                )));
                return Ok(self.messages());
            }
        };

        let outcome = self.lock_state()?.ingest(fresh.clone());
        if outcome.should_render() {
            self.persist(&session)?;
            self.bus.publish_messages(session.user_id, fresh);
        }
        Ok(outcome.messages)
    }

    /// Send a message optimistically: it appears on the timeline at once
    /// with a temporary id and is replaced in place by the server record.
    ///
    /// A server rejection rolls the optimistic entry back.  An unreachable
    /// server keeps it, queued for the polling task to deliver; the
    /// returned message is then still the local echo.
    pub async fn send_message(&self, content: &str) -> Result<Message> {
        let session = self.require_session()?;

        let content = match validate_content(content) {
            Ok(content) => content,
            Err(e) => {
                self.emit(ClientEvent::Notice(Notice::error(e.to_string())));
                return Err(e.into());
            }
        };

        let local = Message::new_local(session.user_id, &session.username, &content);
        self.lock_state()?.ingest(vec![local.clone()]);
        self.emit(ClientEvent::MessagesUpdated {
            added: 1,
            replaced: 0,
            removed: 0,
        });

        match self.api.send_message(&content).await {
            Ok(confirmed) => {
                self.lock_state()?.reconcile(&local.id, confirmed.clone());
                self.persist(&session)?;
                self.bus
                    .publish_messages(session.user_id, vec![confirmed.clone()]);
                self.emit(ClientEvent::MessagesUpdated {
                    added: 0,
                    replaced: 1,
                    removed: 0,
                });
                debug!(message_id = %confirmed.id, "Message confirmed");
                Ok(confirmed)
            }
            Err(ApiError::Api(reason)) => {
                self.lock_state()?.remove_message(&local.id);
                warn!(reason = %reason, "Message rejected");
                self.emit(ClientEvent::MessagesUpdated {
                    added: 0,
                    replaced: 0,
                    removed: 1,
                });
                self.emit(ClientEvent::Notice(Notice::error(format!(
                    "Message could not be sent: {reason}"
                ))));
                Err(ClientError::Api(ApiError::Api(reason)))
            }
            Err(e) if e.is_auth() => {
                // Keep the draft; it goes out after the next login.
                self.lock_state()?.queue_send(local.id.clone(), content);
                self.emit(ClientEvent::SessionExpired);
                Err(e.into())
            }
            Err(e) => {
                self.lock_state()?.queue_send(local.id.clone(), content);
                self.persist(&session)?;
                warn!(error = %e, "Send queued for retry");
                self.emit(ClientEvent::Notice(Notice::warning(
                    "Message queued, sending when the connection returns",
                )));
                Ok(local)
            }
        }
    }

    /// Upload a file and land the resulting file message on the timeline.
    /// No optimistic echo here; the server owns the stored path.
    pub async fn upload_file(&self, file_name: &str, bytes: Vec<u8>) -> Result<Message> {
        let session = self.require_session()?;

        if let Err(e) = validate_upload(file_name, bytes.len()) {
            self.emit(ClientEvent::Notice(Notice::error(e.to_string())));
            return Err(e.into());
        }

        match self.api.upload_file(file_name, bytes).await {
            Ok(message) => {
                let outcome = self.lock_state()?.ingest(vec![message.clone()]);
                if outcome.should_render() {
                    self.persist(&session)?;
                    self.bus
                        .publish_messages(session.user_id, vec![message.clone()]);
                    self.emit(ClientEvent::MessagesUpdated {
                        added: outcome.added,
                        replaced: outcome.replaced,
                        removed: 0,
                    });
                }
                info!(message_id = %message.id, file_name, "Upload complete");
                Ok(message)
            }
            Err(e) if e.is_auth() => {
                self.emit(ClientEvent::SessionExpired);
                Err(e.into())
            }
            Err(e) => {
                warn!(error = %e, file_name, "Upload failed");
                self.emit(ClientEvent::Notice(Notice::error("Upload failed")));
                Err(e.into())
            }
        }
    }

    /// Toggle the current user's reaction on a message.  The server returns
    /// the full reaction set, which replaces the message's reactions via
    /// the merge engine.
    pub async fn toggle_reaction(
        &self,
        message_id: &MessageId,
        emoji: &str,
    ) -> Result<Vec<Reaction>> {
        let session = self.require_session()?;

        let reactions = match self.api.toggle_reaction(message_id, emoji).await {
            Ok(reactions) => reactions,
            Err(e) if e.is_auth() => {
                self.emit(ClientEvent::SessionExpired);
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        let updated = {
            let mut state = self.lock_state()?;
            match state.message(message_id) {
                Some(mut message) => {
                    message.reactions = reactions.clone();
                    let outcome = state.ingest(vec![message.clone()]);
                    Some((message, outcome))
                }
                None => None,
            }
        };

        if let Some((message, outcome)) = updated {
            if outcome.should_render() {
                self.persist(&session)?;
                self.bus.publish_messages(session.user_id, vec![message]);
                self.emit(ClientEvent::MessagesUpdated {
                    added: 0,
                    replaced: outcome.replaced,
                    removed: 0,
                });
            }
        }

        Ok(reactions)
    }

    /// Drop the local history and its cached snapshot.  Server history is
    /// untouched.
    pub fn clear_history(&self) -> Result<()> {
        let session = self.require_session()?;
        self.lock_state()?.clear_history();
        self.store.clear(session.user_id);
        self.emit(ClientEvent::HistoryCleared);
        info!(user_id = session.user_id, "Local history cleared");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Directory
    // -----------------------------------------------------------------------

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.require_session()?;
        Ok(self.api.list_users().await?)
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>> {
        self.require_session()?;
        Ok(self.api.list_groups().await?)
    }

    // -----------------------------------------------------------------------
    // Polling
    // -----------------------------------------------------------------------

    /// Start the background polling task.  Calling this while one is
    /// already running is a no-op.
    pub fn start_polling(&mut self) -> Result<()> {
        self.require_session()?;

        if let Some(handle) = &self.poller {
            if !handle.is_finished() {
                debug!("Polling already running");
                return Ok(());
            }
        }

        let config = PollerConfig {
            poll_interval: self.config.poll_interval,
            fetch_limit: self.config.fetch_limit,
            max_backoff: self.config.max_backoff,
        };
        self.poller = Some(spawn_poller(
            self.api.clone(),
            self.state.clone(),
            self.store.clone(),
            self.bus.clone(),
            self.events.clone(),
            config,
        ));
        Ok(())
    }

    /// Stop the polling task and wait for it to wind down.
    pub async fn stop_polling(&mut self) {
        if let Some(handle) = self.poller.take() {
            handle.stop().await;
        }
    }

    /// Forward a visibility change to the polling task.
    pub async fn set_visibility(&self, visible: bool) {
        if let Some(handle) = &self.poller {
            handle.set_visibility(visible).await;
        }
    }

    /// Forward a connectivity change to the polling task.
    pub async fn set_connectivity(&self, online: bool) {
        if let Some(handle) = &self.poller {
            handle.set_connectivity(online).await;
        }
    }

    /// Orderly teardown: stop polling and flush the timeline to the cache.
    pub async fn shutdown(&mut self) {
        self.stop_polling().await;

        let flushed = match self.state.lock() {
            Ok(state) => state
                .session()
                .map(|session| (session.clone(), state.snapshot())),
            Err(_) => None,
        };
        if let Some((session, snapshot)) = flushed {
            if !snapshot.is_empty() {
                self.store.write(&CacheEnvelope::new(
                    session.user_id,
                    &session.username,
                    snapshot,
                ));
            }
        }
        info!("Client shut down");
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Subscribe to client events.  Every subscriber sees every event from
    /// the moment of subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// The current merged timeline.
    pub fn messages(&self) -> Vec<Message> {
        match self.state.lock() {
            Ok(state) => state.snapshot(),
            Err(_) => Vec::new(),
        }
    }

    pub fn current_session(&self) -> Option<Session> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.session().cloned())
    }

    /// Sends waiting for the connection to return.
    pub fn queued_sends(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.queued_sends())
            .unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    fn require_session(&self) -> Result<Session> {
        self.lock_state()?
            .session()
            .cloned()
            .ok_or(ClientError::NotAuthenticated)
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, ChatState>> {
        self.state.lock().map_err(|_| ClientError::StatePoisoned)
    }

    /// Write the merged timeline through to the local cache.
    fn persist(&self, session: &Session) -> Result<()> {
        let snapshot = self.lock_state()?.snapshot();
        self.store.write(&CacheEnvelope::new(
            session.user_id,
            &session.username,
            snapshot,
        ));
        Ok(())
    }

    fn emit(&self, event: ClientEvent) {
        // Err means nobody is subscribed right now, which is fine.
        let _ = self.events.send(event);
    }
}
