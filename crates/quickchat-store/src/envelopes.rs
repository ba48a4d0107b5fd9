//! Typed CRUD helpers for cached message envelopes.

use chrono::{Duration, Utc};
use rusqlite::params;

use quickchat_shared::CacheEnvelope;

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    /// Insert or replace the cached snapshot for the envelope's owner.
    pub fn write_envelope(&self, envelope: &CacheEnvelope) -> Result<()> {
        let payload = serde_json::to_string(envelope)?;
        self.conn().execute(
            "INSERT INTO message_cache (user_id, payload, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                 payload = excluded.payload,
                 updated_at = excluded.updated_at",
            params![envelope.user_id, payload, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Load the cached snapshot for one user.
    ///
    /// Returns [`StoreError::NotFound`] when the user has no snapshot and
    /// [`StoreError::Json`] when the stored payload no longer parses (a
    /// schema drift across app versions, or a tampered file).
    pub fn read_envelope(&self, user_id: i64) -> Result<CacheEnvelope> {
        let payload: String = self
            .conn()
            .query_row(
                "SELECT payload FROM message_cache WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;

        Ok(serde_json::from_str(&payload)?)
    }

    /// Load the most recently written snapshot regardless of owner.
    ///
    /// Used at startup, before any session exists, to know which account
    /// last used this device.
    pub fn latest_envelope(&self) -> Result<CacheEnvelope> {
        let payload: String = self
            .conn()
            .query_row(
                "SELECT payload FROM message_cache
                 ORDER BY updated_at DESC
                 LIMIT 1",
                [],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;

        Ok(serde_json::from_str(&payload)?)
    }

    /// Remove one user's snapshot.  Returns whether a row existed.
    pub fn clear_envelope(&self, user_id: i64) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM message_cache WHERE user_id = ?1",
            params![user_id],
        )?;
        Ok(affected > 0)
    }

    /// Delete snapshots older than `max_age` and drop leftovers from
    /// pre-1.0 installs.  Returns the number of snapshots removed.
    ///
    /// `updated_at` is written by this crate in one fixed RFC-3339 UTC
    /// format, so string comparison orders correctly.
    pub fn sweep_stale(&self, max_age: Duration) -> Result<usize> {
        let cutoff = (Utc::now() - max_age).to_rfc3339();
        let removed = self.conn().execute(
            "DELETE FROM message_cache WHERE updated_at < ?1",
            params![cutoff],
        )?;

        // Early builds cached under a different schema; nothing in it is
        // worth migrating, old installs just carry the dead table around.
        self.conn()
            .execute_batch("DROP TABLE IF EXISTS message_cache_legacy")?;

        Ok(removed)
    }
}
