//! Cross-instance render sync.
//!
//! Several client instances in one process (multiple windows over the same
//! profile) share a [`SyncBus`].  Whichever instance fetches first
//! publishes the batch; every other instance merges it right away instead
//! of waiting for its own next poll.  The merge engine is idempotent, so
//! an instance receiving its own publication applies a no-op.

use tokio::sync::broadcast;

use quickchat_shared::Message;

/// Capacity of the bus channel.  A lagging subscriber drops the oldest
/// batches and recovers them on its next poll.
const SYNC_BUS_CAPACITY: usize = 64;

/// A notification shared between client instances.
#[derive(Debug, Clone)]
pub enum BusMessage {
    /// Freshly fetched or confirmed messages for one user's history.
    FreshMessages {
        user_id: i64,
        messages: Vec<Message>,
    },
    /// The user logged out somewhere; every instance drops the session.
    LoggedOut { user_id: i64 },
}

/// Broadcast channel shared by the client instances of one process.
#[derive(Debug, Clone)]
pub struct SyncBus {
    tx: broadcast::Sender<BusMessage>,
}

impl SyncBus {
    pub fn new() -> Self {
        Self::with_capacity(SYNC_BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe; the receiver sees every notification published after
    /// this call.
    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.tx.subscribe()
    }

    /// Publish fetched or confirmed messages.  Empty batches are not
    /// worth waking anyone for.
    pub fn publish_messages(&self, user_id: i64, messages: Vec<Message>) {
        if messages.is_empty() {
            return;
        }
        // Err means nobody is subscribed right now, which is fine.
        let _ = self.tx.send(BusMessage::FreshMessages { user_id, messages });
    }

    /// Announce a logout.
    pub fn publish_logout(&self, user_id: i64) {
        let _ = self.tx.send(BusMessage::LoggedOut { user_id });
    }
}

impl Default for SyncBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> Vec<Message> {
        vec![Message::new_local(1, "alice", "hi")]
    }

    #[tokio::test]
    async fn every_subscriber_sees_a_published_batch() {
        let bus = SyncBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish_messages(1, batch());

        assert!(matches!(
            a.recv().await.unwrap(),
            BusMessage::FreshMessages { user_id: 1, .. }
        ));
        assert!(matches!(
            b.recv().await.unwrap(),
            BusMessage::FreshMessages { user_id: 1, .. }
        ));
    }

    #[tokio::test]
    async fn empty_batches_are_not_published() {
        let bus = SyncBus::new();
        let mut rx = bus.subscribe();

        bus.publish_messages(1, Vec::new());
        bus.publish_logout(1);

        // The logout arrives first because the empty batch never went out.
        assert!(matches!(
            rx.recv().await.unwrap(),
            BusMessage::LoggedOut { user_id: 1 }
        ));
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        let bus = SyncBus::new();
        bus.publish_messages(1, batch());
        bus.publish_logout(1);
    }
}
