//! The polling coordinator.
//!
//! One background task per client instance drives the fetch-merge-persist
//! cycle.  External code controls it through a typed command channel, the
//! same shape as the rest of the workspace's long-lived tasks: commands go
//! in, events come out on the client's broadcast channel.  The task reacts
//! to visibility and connectivity changes, stretches its interval while
//! the server is unreachable, and applies batches other instances publish
//! on the sync bus.  It owns no timeline data of its own; every mutation
//! goes through the shared [`ChatState`](crate::state::ChatState).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use quickchat_api::ApiError;
use quickchat_shared::constants::{
    DEFAULT_FETCH_LIMIT, DEFAULT_MAX_BACKOFF_MS, DEFAULT_POLL_INTERVAL_MS,
};
use quickchat_shared::{CacheEnvelope, Message};
use quickchat_store::EnvelopeStore;

use crate::bus::{BusMessage, SyncBus};
use crate::events::{ClientEvent, Notice};
use crate::state::{PendingSend, Session, SharedState};
use crate::transport::ChatApi;

// ---------------------------------------------------------------------------
// Commands and configuration
// ---------------------------------------------------------------------------

/// Commands sent *into* the polling task.
#[derive(Debug)]
pub enum PollerCommand {
    /// The owning view became visible (`true`) or hidden (`false`).
    VisibilityChanged(bool),
    /// The platform reported the network up (`true`) or down (`false`).
    ConnectivityChanged(bool),
    /// Stop the task.
    Stop,
}

/// Polling schedule parameters.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Base interval between polls.
    pub poll_interval: Duration,
    /// Maximum messages requested per fetch.
    pub fetch_limit: u32,
    /// Ceiling for the failure backoff.
    pub max_backoff: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            fetch_limit: DEFAULT_FETCH_LIMIT,
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
        }
    }
}

/// Handle to a running polling task.
pub struct PollerHandle {
    cmd_tx: mpsc::Sender<PollerCommand>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Forward a visibility change.
    pub async fn set_visibility(&self, visible: bool) {
        let _ = self
            .cmd_tx
            .send(PollerCommand::VisibilityChanged(visible))
            .await;
    }

    /// Forward a connectivity change.
    pub async fn set_connectivity(&self, online: bool) {
        let _ = self
            .cmd_tx
            .send(PollerCommand::ConnectivityChanged(online))
            .await;
    }

    /// Stop the task and wait for it to wind down, so no further tick can
    /// fire after this returns.
    pub async fn stop(self) {
        let _ = self.cmd_tx.send(PollerCommand::Stop).await;
        let _ = self.task.await;
    }

    /// Whether the task already exited on its own (session loss does).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn the polling task.
///
/// The first poll happens immediately so a fresh view paints without
/// waiting an interval; afterwards the task settles into
/// `config.poll_interval`, stretched while polls fail.
pub fn spawn_poller(
    api: Arc<dyn ChatApi>,
    state: SharedState,
    store: Arc<dyn EnvelopeStore>,
    bus: SyncBus,
    events: broadcast::Sender<ClientEvent>,
    config: PollerConfig,
) -> PollerHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let bus_rx = bus.subscribe();

    let poller = Poller {
        api,
        state,
        store,
        bus,
        events,
        config,
        visible: true,
        online: true,
        consecutive_failures: 0,
    };

    let task = tokio::spawn(poller.run(cmd_rx, bus_rx));

    PollerHandle { cmd_tx, task }
}

// ---------------------------------------------------------------------------
// The task
// ---------------------------------------------------------------------------

struct Poller {
    api: Arc<dyn ChatApi>,
    state: SharedState,
    store: Arc<dyn EnvelopeStore>,
    bus: SyncBus,
    events: broadcast::Sender<ClientEvent>,
    config: PollerConfig,
    visible: bool,
    online: bool,
    consecutive_failures: u32,
}

impl Poller {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<PollerCommand>,
        mut bus_rx: broadcast::Receiver<BusMessage>,
    ) {
        info!(interval = ?self.config.poll_interval, "Polling started");

        let mut next_tick = Instant::now();

        loop {
            tokio::select! {
                // --- Schedule and visibility commands ---
                cmd = cmd_rx.recv() => {
                    let was_active = self.is_active();
                    match cmd {
                        Some(PollerCommand::VisibilityChanged(visible)) => {
                            debug!(visible, "Visibility changed");
                            self.visible = visible;
                        }
                        Some(PollerCommand::ConnectivityChanged(online)) => {
                            debug!(online, "Connectivity changed");
                            self.online = online;
                        }
                        Some(PollerCommand::Stop) | None => {
                            info!("Polling stopped");
                            break;
                        }
                    }
                    // Resuming polls immediately instead of waiting out
                    // the old schedule.
                    if !was_active && self.is_active() {
                        next_tick = Instant::now();
                    }
                }

                // --- Batches other instances published ---
                update = bus_rx.recv() => {
                    match update {
                        Ok(message) => {
                            if !self.apply_bus_message(message) {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            // Dropped batches come back on the next poll.
                            warn!(skipped, "Sync bus lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }

                // --- The poll itself ---
                _ = sleep_until(next_tick), if self.is_active() => {
                    if !self.tick().await {
                        break;
                    }
                    next_tick = Instant::now() + self.current_interval();
                }
            }
        }
    }

    /// Polls happen only while the view is visible and the network is up.
    fn is_active(&self) -> bool {
        self.visible && self.online
    }

    /// Base interval, doubled per consecutive failure and capped at the
    /// configured ceiling.
    fn current_interval(&self) -> Duration {
        if self.consecutive_failures == 0 {
            return self.config.poll_interval;
        }
        let factor = 2u32.saturating_pow(self.consecutive_failures.min(16));
        self.config
            .poll_interval
            .saturating_mul(factor)
            .min(self.config.max_backoff)
    }

    /// One poll cycle.  Returns `false` when the task must stop because
    /// the session is gone.
    async fn tick(&mut self) -> bool {
        match self.try_tick().await {
            Ok(()) => {
                if self.consecutive_failures > 0 {
                    info!(
                        after_failures = self.consecutive_failures,
                        "Polling recovered"
                    );
                    self.consecutive_failures = 0;
                    self.emit(ClientEvent::SyncChanged {
                        connected: true,
                        consecutive_failures: 0,
                    });
                }
                true
            }
            Err(e) if e.is_auth() => {
                warn!("Session expired, polling stops");
                self.emit(ClientEvent::SessionExpired);
                false
            }
            Err(e) => {
                self.consecutive_failures += 1;
                warn!(
                    error = %e,
                    consecutive_failures = self.consecutive_failures,
                    next_in = ?self.current_interval(),
                    "Poll failed"
                );
                if self.consecutive_failures == 1 {
                    self.emit(ClientEvent::SyncChanged {
                        connected: false,
                        consecutive_failures: 1,
                    });
                    self.emit(ClientEvent::Notice(Notice::warning(
                        "Connection lost, retrying in the background",
                    )));
                }
                true
            }
        }
    }

    /// Fetch after the cursor, merge, flush queued sends, persist, share.
    async fn try_tick(&mut self) -> Result<(), ApiError> {
        // Snapshot what the tick needs, then release the lock before any
        // await.
        let Some((session, after_id)) = self.session_cursor() else {
            return Ok(());
        };

        let fresh = self
            .api
            .fetch_messages(after_id, self.config.fetch_limit)
            .await?;

        let outcome = {
            let Ok(mut state) = self.state.lock() else {
                warn!("Shared state lock poisoned, skipping poll");
                return Ok(());
            };
            state.ingest(fresh.clone())
        };

        let confirmed = self.flush_outbox().await?;

        if outcome.should_render() || !confirmed.is_empty() {
            debug!(
                added = outcome.added,
                replaced = outcome.replaced,
                confirmed = confirmed.len(),
                "Timeline changed"
            );
            self.persist(&session);

            let mut shared = fresh;
            shared.extend(confirmed.iter().cloned());
            self.bus.publish_messages(session.user_id, shared);

            self.emit(ClientEvent::MessagesUpdated {
                added: outcome.added,
                replaced: outcome.replaced + confirmed.len(),
                removed: 0,
            });
        }

        Ok(())
    }

    /// Try to deliver queued sends, oldest first.
    ///
    /// Confirmed messages are reconciled into the timeline in place.  A
    /// server rejection drops its optimistic entry.  A transient failure
    /// puts everything left back in order and waits for the next tick; a
    /// session failure propagates so the loop stops.
    async fn flush_outbox(&mut self) -> Result<Vec<Message>, ApiError> {
        let mut pending: VecDeque<PendingSend> = {
            let Ok(mut state) = self.state.lock() else {
                return Ok(Vec::new());
            };
            state.take_outbox().into()
        };

        if pending.is_empty() {
            return Ok(Vec::new());
        }

        debug!(queued = pending.len(), "Flushing queued sends");
        let mut confirmed = Vec::new();

        while let Some(send) = pending.pop_front() {
            match self.api.send_message(&send.content).await {
                Ok(message) => {
                    if let Ok(mut state) = self.state.lock() {
                        state.reconcile(&send.temp_id, message.clone());
                    }
                    confirmed.push(message);
                }
                Err(ApiError::Api(reason)) => {
                    // The server looked at it and said no; retrying cannot
                    // help.
                    warn!(temp_id = %send.temp_id, reason = %reason, "Queued send rejected");
                    if let Ok(mut state) = self.state.lock() {
                        state.remove_message(&send.temp_id);
                    }
                    self.emit(ClientEvent::Notice(Notice::error(format!(
                        "Message could not be sent: {reason}"
                    ))));
                    self.emit(ClientEvent::MessagesUpdated {
                        added: 0,
                        replaced: 0,
                        removed: 1,
                    });
                }
                Err(e) => {
                    // Put this send and the rest back, in order.
                    pending.push_front(send);
                    if let Ok(mut state) = self.state.lock() {
                        state.requeue(pending.into());
                    }
                    if e.is_auth() {
                        return Err(e);
                    }
                    debug!(error = %e, "Queued sends still undeliverable");
                    break;
                }
            }
        }

        Ok(confirmed)
    }

    /// Apply a notification another instance published.  Returns `false`
    /// when the task must stop (logout elsewhere).
    fn apply_bus_message(&mut self, message: BusMessage) -> bool {
        match message {
            BusMessage::FreshMessages { user_id, messages } => {
                let Some((session, _)) = self.session_cursor() else {
                    return true;
                };
                if user_id != session.user_id {
                    return true;
                }

                let outcome = {
                    let Ok(mut state) = self.state.lock() else {
                        return true;
                    };
                    state.ingest(messages)
                };

                // Re-applying a batch this instance published itself is a
                // no-op, so only genuine news reaches the store and the
                // surface.
                if outcome.should_render() {
                    debug!(
                        added = outcome.added,
                        replaced = outcome.replaced,
                        "Applied shared batch"
                    );
                    self.persist(&session);
                    self.emit(ClientEvent::MessagesUpdated {
                        added: outcome.added,
                        replaced: outcome.replaced,
                        removed: 0,
                    });
                }
                true
            }
            BusMessage::LoggedOut { user_id } => {
                let Some((session, _)) = self.session_cursor() else {
                    return true;
                };
                if user_id != session.user_id {
                    return true;
                }

                info!("Logout observed on the sync bus, polling stops");
                if let Ok(mut state) = self.state.lock() {
                    state.reset();
                }
                self.emit(ClientEvent::LoggedOut);
                false
            }
        }
    }

    /// The live session and the fetch cursor, or `None` when logged out.
    fn session_cursor(&self) -> Option<(Session, Option<i64>)> {
        let state = self.state.lock().ok()?;
        let session = state.session()?.clone();
        Some((session, state.cursor()))
    }

    /// Write the merged timeline through to the local cache.
    fn persist(&self, session: &Session) {
        let snapshot = {
            let Ok(state) = self.state.lock() else {
                return;
            };
            state.snapshot()
        };
        self.store.write(&CacheEnvelope::new(
            session.user_id,
            &session.username,
            snapshot,
        ));
    }

    fn emit(&self, event: ClientEvent) {
        // Err means nobody is subscribed right now, which is fine.
        let _ = self.events.send(event);
    }
}
