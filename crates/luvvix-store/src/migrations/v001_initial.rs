//! v001 -- Initial schema creation.
//!
//! Creates the shared chat tables: `directory_entries`, `conversations`,
//! `participants`, `messages` and `key_wraps`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Public key directory
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS directory_entries (
    user_id     TEXT PRIMARY KEY NOT NULL,   -- UUID
    public_key  TEXT NOT NULL,               -- base64 X25519 public key
    key_version INTEGER NOT NULL DEFAULT 1,
    updated_at  TEXT NOT NULL                -- RFC-3339, microseconds, UTC
);

-- ----------------------------------------------------------------
-- Conversations
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id             TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    kind           TEXT NOT NULL CHECK (kind IN ('private', 'group')),
    encrypted_name TEXT,
    created_by     TEXT NOT NULL,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_conversations_updated
    ON conversations(updated_at DESC);

-- ----------------------------------------------------------------
-- Participants
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS participants (
    conversation_id TEXT NOT NULL,             -- FK -> conversations(id)
    user_id         TEXT NOT NULL,
    role            TEXT NOT NULL CHECK (role IN ('admin', 'member')),
    joined_at       TEXT NOT NULL,
    public_key      TEXT,                      -- key snapshot, NULL for plaintext chats
    key_version     INTEGER,

    PRIMARY KEY (conversation_id, user_id),
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
    CHECK ((public_key IS NULL) = (key_version IS NULL))
);

CREATE INDEX IF NOT EXISTS idx_participants_user ON participants(user_id);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,  -- insertion order
    id              TEXT NOT NULL UNIQUE,               -- UUID v4
    conversation_id TEXT NOT NULL,                      -- FK -> conversations(id)
    sender_id       TEXT NOT NULL,
    kind            TEXT NOT NULL CHECK (kind IN ('text', 'image', 'file', 'system')),
    content         TEXT,                               -- codec output, NULL once deleted
    is_deleted      INTEGER NOT NULL DEFAULT 0,
    sent_at         TEXT NOT NULL,
    edited_at       TEXT,

    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
    CHECK ((is_deleted = 0 AND content IS NOT NULL) OR (is_deleted = 1 AND content IS NULL))
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_sent
    ON messages(conversation_id, sent_at, seq);

-- ----------------------------------------------------------------
-- Key wraps: one sealed content key per (item, recipient)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS key_wraps (
    subject_id   TEXT NOT NULL,    -- message id or conversation id (name)
    recipient_id TEXT NOT NULL,
    key_version  INTEGER NOT NULL,
    wrapped_key  TEXT NOT NULL,    -- base64 sealed box

    PRIMARY KEY (subject_id, recipient_id)
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
