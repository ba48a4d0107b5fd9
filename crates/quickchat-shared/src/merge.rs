//! Reconciliation of cached message history with freshly fetched batches.
//!
//! Everything here is pure: no I/O, no clocks, no channels.  The polling
//! coordinator and the client operations funnel every list mutation through
//! this module, so the ordering and dedup invariants hold no matter where a
//! batch came from (HTTP poll, send confirmation, cross-instance sync bus).

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::types::{Message, MessageId};

/// Result of merging a fresh batch into the cached list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The merged, ordered, deduplicated list.
    pub messages: Vec<Message>,
    /// Number of messages not previously present.
    pub added: usize,
    /// Number of existing entries whose record actually changed.
    pub replaced: usize,
}

impl MergeOutcome {
    /// The render-sync decision: rebuild the view only when the merge added
    /// at least one new id or materially replaced an existing entry.  A
    /// no-op merge (empty batch, or a batch already applied) must not cause
    /// a redraw.
    pub fn should_render(&self) -> bool {
        self.added > 0 || self.replaced > 0
    }
}

/// Merge `fresh` into `cached`.
///
/// Matching ids are identities: the fetched copy wins and replaces the
/// cached one *in place*, so an edit or a reaction update is a replacement,
/// never a duplicate append.  A fetched copy identical to the cached one
/// counts as nothing at all, which makes re-merging an already-seen batch a
/// true no-op.  Messages with new ids are inserted at their ordered
/// position, which for a normal poll is the tail.
pub fn merge(cached: &[Message], fresh: Vec<Message>) -> MergeOutcome {
    let mut messages: Vec<Message> = cached.to_vec();
    let mut added = 0usize;
    let mut replaced = 0usize;

    for incoming in dedup_by_id(fresh) {
        match messages.iter().position(|m| m.id == incoming.id) {
            Some(idx) => {
                if messages[idx] != incoming {
                    messages[idx] = incoming;
                    replaced += 1;
                }
            }
            None => {
                insert_ordered(&mut messages, incoming);
                added += 1;
            }
        }
    }

    MergeOutcome {
        messages,
        added,
        replaced,
    }
}

/// Replace the optimistic entry `temp_id` with the server-confirmed record,
/// preserving its position.
///
/// If a poll raced the send response and the confirmed id is already in the
/// list, the temporary entry is dropped instead of duplicating.  If no
/// temporary entry exists (history cleared mid-flight), the confirmed
/// message is still inserted.  Returns `true` when the list changed.
pub fn reconcile_optimistic(
    messages: &mut Vec<Message>,
    temp_id: &MessageId,
    confirmed: Message,
) -> bool {
    let temp_idx = messages.iter().position(|m| &m.id == temp_id);
    let confirmed_idx = messages.iter().position(|m| m.id == confirmed.id);

    match (temp_idx, confirmed_idx) {
        // Normal path: swap the optimistic record for the server echo.
        (Some(t), None) => {
            messages[t] = confirmed;
            true
        }
        // The poll already delivered the authoritative record: keep it
        // fresh, drop the temporary duplicate.
        (Some(t), Some(c)) => {
            if messages[c] != confirmed {
                messages[c] = confirmed;
            }
            messages.remove(t);
            true
        }
        (None, Some(c)) => {
            let changed = messages[c] != confirmed;
            if changed {
                messages[c] = confirmed;
            }
            changed
        }
        (None, None) => {
            insert_ordered(messages, confirmed);
            true
        }
    }
}

/// Drop duplicate ids within a single batch, keeping the last occurrence
/// (when the server repeats an edited record the later copy is the newer
/// one).
fn dedup_by_id(batch: Vec<Message>) -> Vec<Message> {
    let mut seen: HashSet<MessageId> = HashSet::with_capacity(batch.len());
    let mut kept: Vec<Message> = Vec::with_capacity(batch.len());

    for message in batch.into_iter().rev() {
        if seen.insert(message.id.clone()) {
            kept.push(message);
        }
    }

    kept.reverse();
    kept
}

/// Insert into an already-ordered list, scanning from the tail: a fresh
/// batch almost always lands at the end, so the common case is O(1).
fn insert_ordered(messages: &mut Vec<Message>, incoming: Message) {
    let mut idx = messages.len();
    while idx > 0 && order(&messages[idx - 1], &incoming) == Ordering::Greater {
        idx -= 1;
    }
    messages.insert(idx, incoming);
}

/// Canonical ordering: server ids ascending when both sides carry one,
/// creation time ascending otherwise (temporary ids are not comparable).
fn order(a: &Message, b: &Message) -> Ordering {
    match (a.id.server_id(), b.id.server_id()) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.created_at.cmp(&b.created_at),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::types::{MessageType, Reaction};

    fn msg(id: i64, content: &str) -> Message {
        msg_at(id, content, 0)
    }

    fn msg_at(id: i64, content: &str, minute: u32) -> Message {
        Message {
            id: MessageId::Server(id),
            user_id: 1,
            username: "alice".into(),
            content: content.into(),
            message_type: MessageType::Text,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap(),
            edited_at: None,
            reactions: Vec::new(),
            is_local: false,
        }
    }

    fn local_msg(temp: &str, minute: u32) -> Message {
        Message {
            id: MessageId::Local(temp.into()),
            user_id: 1,
            username: "alice".into(),
            content: "pending".into(),
            message_type: MessageType::Text,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap(),
            edited_at: None,
            reactions: Vec::new(),
            is_local: true,
        }
    }

    fn ids(messages: &[Message]) -> Vec<String> {
        messages.iter().map(|m| m.id.to_string()).collect()
    }

    #[test]
    fn fresh_login_with_empty_cache() {
        let outcome = merge(&[], vec![msg(1, "a"), msg(2, "b")]);
        assert_eq!(ids(&outcome.messages), ["1", "2"]);
        assert_eq!(outcome.added, 2);
        assert_eq!(outcome.replaced, 0);
        assert!(outcome.should_render());
    }

    #[test]
    fn empty_fresh_batch_is_a_no_op() {
        let cached = vec![msg(1, "a"), msg(2, "b")];
        let outcome = merge(&cached, Vec::new());
        assert_eq!(outcome.messages, cached);
        assert!(!outcome.should_render());
    }

    #[test]
    fn overlapping_poll_does_not_duplicate() {
        // Cursor was at 2 but the server included id 3 again.
        let cached = vec![msg(1, "a"), msg(2, "b"), msg(3, "c")];
        let outcome = merge(&cached, vec![msg(3, "c"), msg(4, "d")]);
        assert_eq!(ids(&outcome.messages), ["1", "2", "3", "4"]);
        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.replaced, 0);
    }

    #[test]
    fn merge_is_idempotent() {
        let cached = vec![msg(1, "a"), msg(2, "b")];
        let batch = vec![msg(2, "b"), msg(3, "c")];

        let once = merge(&cached, batch.clone());
        let twice = merge(&once.messages, batch);

        assert_eq!(twice.messages, once.messages);
        assert_eq!(twice.added, 0);
        assert_eq!(twice.replaced, 0);
        assert!(!twice.should_render());
    }

    #[test]
    fn edited_message_replaces_in_place() {
        let cached = vec![msg(1, "a"), msg(2, "original"), msg(3, "c")];
        let mut edited = msg(2, "edited");
        edited.edited_at = Some(Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap());

        let outcome = merge(&cached, vec![edited.clone()]);
        assert_eq!(ids(&outcome.messages), ["1", "2", "3"]);
        assert_eq!(outcome.messages[1], edited);
        assert_eq!(outcome.added, 0);
        assert_eq!(outcome.replaced, 1);
        assert!(outcome.should_render());
    }

    #[test]
    fn reaction_update_counts_as_replacement() {
        let cached = vec![msg(5, "hello")];
        let mut reacted = msg(5, "hello");
        reacted.reactions.push(Reaction {
            emoji: "👍".into(),
            count: 1,
            user_ids: vec![2],
        });

        let outcome = merge(&cached, vec![reacted]);
        assert_eq!(outcome.replaced, 1);
        assert!(outcome.should_render());
    }

    #[test]
    fn batch_internal_duplicates_keep_last_copy() {
        let outcome = merge(&[], vec![msg(1, "v1"), msg(2, "x"), msg(1, "v2")]);
        assert_eq!(ids(&outcome.messages), ["1", "2"]);
        assert_eq!(outcome.messages[0].content, "v2");
        assert_eq!(outcome.added, 2);
    }

    #[test]
    fn out_of_order_batch_is_sorted_by_id() {
        let cached = vec![msg(2, "b"), msg(4, "d")];
        let outcome = merge(&cached, vec![msg(5, "e"), msg(1, "a"), msg(3, "c")]);
        assert_eq!(ids(&outcome.messages), ["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn merged_list_is_monotonic() {
        let cached = vec![msg_at(1, "a", 1), msg_at(3, "c", 3)];
        let fresh = vec![msg_at(2, "b", 2), local_msg("local-t1", 9)];
        let outcome = merge(&cached, fresh);

        for pair in outcome.messages.windows(2) {
            match (pair[0].id.server_id(), pair[1].id.server_id()) {
                (Some(x), Some(y)) => assert!(x <= y),
                _ => assert!(pair[0].created_at <= pair[1].created_at),
            }
        }
    }

    #[test]
    fn local_messages_order_by_creation_time() {
        let cached = vec![msg_at(1, "a", 1), msg_at(2, "b", 2)];
        let outcome = merge(&cached, vec![local_msg("local-t1", 5)]);
        assert_eq!(ids(&outcome.messages), ["1", "2", "local-t1"]);
    }

    #[test]
    fn reconcile_replaces_temp_at_same_index() {
        let mut list = vec![msg(1, "a"), local_msg("local-t1", 5), msg(2, "b")];
        let confirmed = msg(57, "confirmed");

        let temp_id = MessageId::Local("local-t1".into());
        assert!(reconcile_optimistic(&mut list, &temp_id, confirmed.clone()));

        assert_eq!(ids(&list), ["1", "57", "2"]);
        assert_eq!(list[1], confirmed);
        assert!(!list[1].is_local);
    }

    #[test]
    fn reconcile_after_poll_race_drops_temp_duplicate() {
        // The poll already delivered id 57 before the send response landed.
        let mut list = vec![msg(1, "a"), msg(57, "confirmed"), local_msg("local-t1", 5)];

        let temp_id = MessageId::Local("local-t1".into());
        assert!(reconcile_optimistic(&mut list, &temp_id, msg(57, "confirmed")));

        assert_eq!(ids(&list), ["1", "57"]);
    }

    #[test]
    fn reconcile_without_temp_inserts_confirmed() {
        let mut list = vec![msg(1, "a")];
        let temp_id = MessageId::Local("local-gone".into());
        assert!(reconcile_optimistic(&mut list, &temp_id, msg(2, "b")));
        assert_eq!(ids(&list), ["1", "2"]);
    }

    #[test]
    fn reconcile_is_idempotent_once_confirmed() {
        let mut list = vec![msg(1, "a"), msg(57, "confirmed")];
        let temp_id = MessageId::Local("local-t1".into());
        assert!(!reconcile_optimistic(&mut list, &temp_id, msg(57, "confirmed")));
        assert_eq!(ids(&list), ["1", "57"]);
    }
}
