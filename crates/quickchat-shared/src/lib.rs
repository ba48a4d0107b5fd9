//! # quickchat-shared
//!
//! Domain types and pure logic shared by every QuickChat crate: the message
//! model, the persisted cache envelope, the merge/reconciliation engine, and
//! input validation.  Nothing in this crate performs I/O, so all of it can be
//! unit-tested without a runtime, a network, or a database.

pub mod constants;
pub mod envelope;
pub mod merge;
pub mod types;
pub mod validate;

pub use envelope::{highest_server_id, CacheEnvelope};
pub use merge::{merge, reconcile_optimistic, MergeOutcome};
pub use types::{Group, Message, MessageId, MessageType, Reaction, User};
pub use validate::{validate_content, validate_upload, ValidationError};
