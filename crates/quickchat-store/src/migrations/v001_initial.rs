//! v001 -- Initial schema creation.
//!
//! Creates the `message_cache` table: one snapshot row per user, with the
//! message history stored as a JSON payload.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Message cache
--
-- One row per local user.  `payload` is the serialized envelope
-- (messages, cursor, snapshot timestamp, owner).  `updated_at` is
-- duplicated outside the JSON so staleness sweeps and the
-- most-recent-user lookup never need to parse payloads.
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS message_cache (
    user_id    INTEGER PRIMARY KEY NOT NULL,
    payload    TEXT NOT NULL,                 -- JSON envelope
    updated_at TEXT NOT NULL                  -- ISO-8601 / RFC-3339
);

CREATE INDEX IF NOT EXISTS idx_message_cache_updated
    ON message_cache(updated_at DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
