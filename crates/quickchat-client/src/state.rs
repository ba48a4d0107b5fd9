//! Shared client state.
//!
//! [`ChatState`] is wrapped in `Arc<Mutex<>>` and shared between the
//! client operations and the polling task.  Lock scopes stay short and
//! never cross an await.  Every timeline mutation funnels through the
//! merge engine, so the ordering and dedup invariants hold no matter who
//! writes.

use std::sync::{Arc, Mutex};

use quickchat_shared::{
    highest_server_id, merge, reconcile_optimistic, MergeOutcome, Message, MessageId, User,
};

/// Shared handle to the client state.
pub type SharedState = Arc<Mutex<ChatState>>;

/// The authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: i64,
    pub username: String,
}

/// A send that has not reached the server yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    /// Temporary id of the optimistic timeline entry.
    pub temp_id: MessageId,
    /// Validated content to submit.
    pub content: String,
}

/// Central client state: the session, the merged timeline, and the queue
/// of unconfirmed sends.
#[derive(Debug)]
pub struct ChatState {
    session: Option<Session>,
    timeline: Vec<Message>,
    outbox: Vec<PendingSend>,
}

impl ChatState {
    pub fn new() -> Self {
        Self {
            session: None,
            timeline: Vec::new(),
            outbox: Vec::new(),
        }
    }

    // -----------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------

    /// Adopt a session for `user`.
    pub fn set_session(&mut self, user: &User) {
        self.session = Some(Session {
            user_id: user.id,
            username: user.username.clone(),
        });
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Drop the session, the timeline, and the outbox.
    pub fn reset(&mut self) {
        self.session = None;
        self.timeline.clear();
        self.outbox.clear();
    }

    // -----------------------------------------------------------------
    // Timeline
    // -----------------------------------------------------------------

    /// Replace the timeline with a cached snapshot.
    ///
    /// Optimistic entries in the snapshot are re-queued for sending, so a
    /// message composed offline survives a restart.
    pub fn seed(&mut self, messages: Vec<Message>) {
        self.outbox = messages
            .iter()
            .filter(|m| m.is_local)
            .map(|m| PendingSend {
                temp_id: m.id.clone(),
                content: m.content.clone(),
            })
            .collect();
        self.timeline = messages;
    }

    /// Merge a fresh batch into the timeline.
    pub fn ingest(&mut self, fresh: Vec<Message>) -> MergeOutcome {
        let outcome = merge(&self.timeline, fresh);
        self.timeline = outcome.messages.clone();
        outcome
    }

    /// Swap the optimistic entry `temp_id` for the confirmed record and
    /// retire its outbox entry.
    pub fn reconcile(&mut self, temp_id: &MessageId, confirmed: Message) -> bool {
        self.outbox.retain(|p| &p.temp_id != temp_id);
        reconcile_optimistic(&mut self.timeline, temp_id, confirmed)
    }

    /// Remove one entry (a rejected optimistic send).  Returns `true`
    /// when it was present.
    pub fn remove_message(&mut self, id: &MessageId) -> bool {
        let before = self.timeline.len();
        self.timeline.retain(|m| &m.id != id);
        self.outbox.retain(|p| &p.temp_id != id);
        self.timeline.len() != before
    }

    /// Drop all messages, keeping the session.
    pub fn clear_history(&mut self) {
        self.timeline.clear();
        self.outbox.clear();
    }

    /// The fetch cursor: highest server-confirmed id in the timeline.
    pub fn cursor(&self) -> Option<i64> {
        highest_server_id(&self.timeline)
    }

    /// A copy of the merged timeline for rendering and persistence.
    pub fn snapshot(&self) -> Vec<Message> {
        self.timeline.clone()
    }

    /// Look up one message by id.
    pub fn message(&self, id: &MessageId) -> Option<Message> {
        self.timeline.iter().find(|m| &m.id == id).cloned()
    }

    pub fn timeline_is_empty(&self) -> bool {
        self.timeline.is_empty()
    }

    // -----------------------------------------------------------------
    // Outbox
    // -----------------------------------------------------------------

    /// Queue a validated send for retry once the server is reachable.
    pub fn queue_send(&mut self, temp_id: MessageId, content: String) {
        self.outbox.push(PendingSend { temp_id, content });
    }

    /// Take the whole outbox, oldest first.
    pub fn take_outbox(&mut self) -> Vec<PendingSend> {
        std::mem::take(&mut self.outbox)
    }

    /// Put back sends that still could not go out, ahead of anything
    /// queued meanwhile, so the original order is preserved.
    pub fn requeue(&mut self, pending: Vec<PendingSend>) {
        self.outbox.splice(0..0, pending);
    }

    pub fn queued_sends(&self) -> usize {
        self.outbox.len()
    }
}

impl Default for ChatState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use quickchat_shared::MessageType;

    use super::*;

    fn user() -> User {
        User {
            id: 7,
            username: "alice".into(),
            is_online: true,
            last_seen: None,
        }
    }

    fn server_msg(id: i64) -> Message {
        Message {
            id: MessageId::Server(id),
            user_id: 7,
            username: "alice".into(),
            content: format!("m{id}"),
            message_type: MessageType::Text,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            edited_at: None,
            reactions: Vec::new(),
            is_local: false,
        }
    }

    #[test]
    fn ingest_funnels_through_the_merge_engine() {
        let mut state = ChatState::new();

        let outcome = state.ingest(vec![server_msg(2), server_msg(1)]);

        assert_eq!(outcome.added, 2);
        assert_eq!(state.cursor(), Some(2));
        assert_eq!(state.snapshot()[0].id, MessageId::Server(1));
    }

    #[test]
    fn seed_requeues_unconfirmed_sends() {
        let mut state = ChatState::new();
        let local = Message::new_local(7, "alice", "offline draft");

        state.seed(vec![server_msg(1), local.clone()]);

        assert_eq!(state.queued_sends(), 1);
        let pending = state.take_outbox();
        assert_eq!(pending[0].temp_id, local.id);
        assert_eq!(pending[0].content, "offline draft");
    }

    #[test]
    fn reconcile_retires_the_outbox_entry() {
        let mut state = ChatState::new();
        let local = Message::new_local(7, "alice", "hi");
        state.ingest(vec![local.clone()]);
        state.queue_send(local.id.clone(), "hi".into());

        assert!(state.reconcile(&local.id, server_msg(5)));

        assert_eq!(state.queued_sends(), 0);
        assert_eq!(state.cursor(), Some(5));
        assert!(!state.snapshot()[0].is_local);
    }

    #[test]
    fn requeue_preserves_send_order() {
        let mut state = ChatState::new();
        state.queue_send(MessageId::Local("local-a".into()), "first".into());
        let taken = state.take_outbox();
        state.queue_send(MessageId::Local("local-b".into()), "second".into());

        state.requeue(taken);

        let outbox = state.take_outbox();
        assert_eq!(outbox[0].content, "first");
        assert_eq!(outbox[1].content, "second");
    }

    #[test]
    fn remove_message_reports_presence() {
        let mut state = ChatState::new();
        let local = Message::new_local(7, "alice", "doomed");
        state.ingest(vec![local.clone()]);

        assert!(state.remove_message(&local.id));
        assert!(!state.remove_message(&local.id));
        assert!(state.timeline_is_empty());
    }

    #[test]
    fn reset_drops_everything() {
        let mut state = ChatState::new();
        state.set_session(&user());
        state.ingest(vec![server_msg(1)]);
        state.queue_send(MessageId::new_local(), "x".into());

        state.reset();

        assert!(state.session().is_none());
        assert!(state.timeline_is_empty());
        assert_eq!(state.queued_sends(), 0);
    }

    #[test]
    fn clear_history_keeps_the_session() {
        let mut state = ChatState::new();
        state.set_session(&user());
        state.ingest(vec![server_msg(1)]);

        state.clear_history();

        assert!(state.timeline_is_empty());
        assert_eq!(state.session().map(|s| s.user_id), Some(7));
    }
}
