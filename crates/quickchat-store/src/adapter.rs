//! Best-effort cache access.
//!
//! The client never fails an operation because the cache failed: a read
//! that hits a missing, corrupt, or foreign snapshot simply reports "no
//! cache" and the conversation loads from the server instead.  Writes log
//! and move on.  The [`EnvelopeStore`] trait is the seam the client
//! consumes, with [`MemoryStore`] standing in for SQLite under test.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Duration;

use quickchat_shared::CacheEnvelope;

use crate::database::Database;
use crate::error::{Result, StoreError};

/// Snapshot persistence as the client sees it: infallible, owner-scoped.
pub trait EnvelopeStore: Send + Sync {
    /// The snapshot for `user_id`, or `None` when there is nothing usable
    /// (absent, unparseable, or recorded under a different owner).
    fn read(&self, user_id: i64) -> Option<CacheEnvelope>;

    /// The most recently written snapshot on this device, any owner.
    fn read_latest(&self) -> Option<CacheEnvelope>;

    /// Persist a snapshot, replacing the owner's previous one.
    fn write(&self, envelope: &CacheEnvelope);

    /// Drop one owner's snapshot.
    fn clear(&self, user_id: i64);

    /// Drop snapshots older than `max_age`; returns how many were removed.
    fn sweep_stale(&self, max_age: Duration) -> usize;
}

/// [`EnvelopeStore`] backed by the SQLite [`Database`].
pub struct LocalStore {
    db: Mutex<Database>,
}

impl LocalStore {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    /// Open the platform-default database.
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(Database::new()?))
    }
}

impl EnvelopeStore for LocalStore {
    fn read(&self, user_id: i64) -> Option<CacheEnvelope> {
        let db = match self.db.lock() {
            Ok(guard) => guard,
            Err(_) => return None,
        };

        match db.read_envelope(user_id) {
            Ok(envelope) if envelope.belongs_to(user_id) => Some(envelope),
            Ok(envelope) => {
                // The row key and the payload owner disagree; the snapshot
                // cannot be trusted, so it goes the way of corrupt JSON.
                tracing::warn!(
                    user_id,
                    payload_owner = envelope.user_id,
                    "cached snapshot owner mismatch, discarding"
                );
                let _ = db.clear_envelope(user_id);
                None
            }
            Err(StoreError::NotFound) => None,
            Err(StoreError::Json(e)) => {
                tracing::warn!(user_id, error = %e, "cached snapshot unreadable, discarding");
                let _ = db.clear_envelope(user_id);
                None
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "cache read failed");
                None
            }
        }
    }

    fn read_latest(&self) -> Option<CacheEnvelope> {
        let db = match self.db.lock() {
            Ok(guard) => guard,
            Err(_) => return None,
        };

        match db.latest_envelope() {
            Ok(envelope) => Some(envelope),
            Err(StoreError::NotFound) => None,
            Err(e) => {
                tracing::warn!(error = %e, "cache lookup failed");
                None
            }
        }
    }

    fn write(&self, envelope: &CacheEnvelope) {
        let db = match self.db.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };

        if let Err(e) = db.write_envelope(envelope) {
            tracing::warn!(user_id = envelope.user_id, error = %e, "cache write failed");
        }
    }

    fn clear(&self, user_id: i64) {
        let db = match self.db.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };

        if let Err(e) = db.clear_envelope(user_id) {
            tracing::warn!(user_id, error = %e, "cache clear failed");
        }
    }

    fn sweep_stale(&self, max_age: Duration) -> usize {
        let db = match self.db.lock() {
            Ok(guard) => guard,
            Err(_) => return 0,
        };

        match db.sweep_stale(max_age) {
            Ok(removed) => {
                if removed > 0 {
                    tracing::info!(removed, "swept stale message snapshots");
                }
                removed
            }
            Err(e) => {
                tracing::warn!(error = %e, "cache sweep failed");
                0
            }
        }
    }
}

/// In-memory [`EnvelopeStore`] for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<i64, CacheEnvelope>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EnvelopeStore for MemoryStore {
    fn read(&self, user_id: i64) -> Option<CacheEnvelope> {
        let entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(_) => return None,
        };
        entries
            .get(&user_id)
            .filter(|envelope| envelope.belongs_to(user_id))
            .cloned()
    }

    fn read_latest(&self) -> Option<CacheEnvelope> {
        let entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(_) => return None,
        };
        entries
            .values()
            .max_by_key(|envelope| envelope.timestamp)
            .cloned()
    }

    fn write(&self, envelope: &CacheEnvelope) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(envelope.user_id, envelope.clone());
        }
    }

    fn clear(&self, user_id: i64) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(&user_id);
        }
    }

    fn sweep_stale(&self, max_age: Duration) -> usize {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(_) => return 0,
        };
        let now = chrono::Utc::now();
        let before = entries.len();
        entries.retain(|_, envelope| !envelope.is_stale(max_age, now));
        before - entries.len()
    }
}
