//! # quickchat-store
//!
//! Local message cache for the QuickChat client, backed by SQLite.
//!
//! The cache is a convenience layer, not the source of truth: the server
//! holds canonical history, this crate only keeps the last known snapshot
//! per user so a restart can paint the conversation before the first fetch
//! returns.  The crate exposes a synchronous [`Database`] handle with typed
//! CRUD helpers, plus the [`EnvelopeStore`] trait the client consumes so
//! tests can substitute an in-memory implementation.

pub mod adapter;
pub mod database;
pub mod envelopes;
pub mod migrations;

mod error;

pub use adapter::{EnvelopeStore, LocalStore, MemoryStore};
pub use database::Database;
pub use error::StoreError;
