//! v001 -- Initial schema creation.
//!
//! Creates the three cache tables: `users`, `conversations`, and `messages`.
//! Set- and map-valued receipt fields are stored as JSON text columns; the
//! cache is a flattened projection, not a normalized schema.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id           TEXT PRIMARY KEY NOT NULL,   -- remote store user id
    display_name TEXT,
    avatar_url   TEXT,
    push_token   TEXT,
    created_at   TEXT NOT NULL                -- ISO-8601 / RFC-3339
);

-- ----------------------------------------------------------------
-- Conversations
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id           TEXT PRIMARY KEY NOT NULL,   -- remote store conversation id
    kind         TEXT NOT NULL,               -- 'direct' | 'group'
    name         TEXT,                        -- group name, NULL for direct
    participants TEXT NOT NULL,               -- JSON array of user ids
    last_message TEXT,                        -- JSON summary, nullable
    updated_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_conversations_updated
    ON conversations(updated_at DESC);

-- ----------------------------------------------------------------
-- Messages (confirmed records only)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id                 TEXT PRIMARY KEY NOT NULL,  -- remote store message id
    client_send_id     TEXT,                       -- correlation id, nullable
    conversation_id    TEXT NOT NULL,
    sender_id          TEXT NOT NULL,
    text               TEXT NOT NULL,
    image              TEXT,                       -- JSON ImageRef, nullable
    timestamp          TEXT NOT NULL,              -- server time, ISO-8601
    delivered_to       TEXT NOT NULL,              -- JSON array of user ids
    read_by            TEXT NOT NULL,              -- JSON array of user ids
    delivered_receipts TEXT NOT NULL,              -- JSON map user -> time
    read_receipts      TEXT NOT NULL               -- JSON map user -> time
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_ts
    ON messages(conversation_id, timestamp ASC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
