//! v001 -- Initial schema creation.
//!
//! Creates the core tables: `users`, `conversations`,
//! `conversation_participants`, `messages`, `message_reactions`,
//! `read_receipts`, `presence`, and `notification_preferences`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (profile cache, synced from the identity provider)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id           TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    display_name TEXT,
    created_at   TEXT NOT NULL                -- ISO-8601 / RFC-3339
);

-- ----------------------------------------------------------------
-- Conversations
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id              TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    kind            TEXT NOT NULL,               -- direct | group | support
    creator_id      TEXT NOT NULL,
    title           TEXT,
    description     TEXT,
    metadata        TEXT NOT NULL DEFAULT '{}',  -- JSON object
    direct_pair_key TEXT,                        -- "<min>:<max>" of the two ids, direct only
    is_active       INTEGER NOT NULL DEFAULT 1,  -- boolean 0/1
    last_message_at TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

-- At most one active direct conversation per unordered participant pair.
-- Concurrent get-or-create callers race on this index; the loser retries
-- the lookup.
CREATE UNIQUE INDEX IF NOT EXISTS idx_conversations_direct_pair
    ON conversations(direct_pair_key)
    WHERE kind = 'direct' AND is_active = 1;

CREATE TABLE IF NOT EXISTS conversation_participants (
    conversation_id TEXT NOT NULL,               -- FK -> conversations(id)
    user_id         TEXT NOT NULL,
    joined_at       TEXT NOT NULL,

    PRIMARY KEY (conversation_id, user_id),
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_participants_user ON conversation_participants(user_id);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id              TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    conversation_id TEXT NOT NULL,               -- FK -> conversations(id)
    sender_id       TEXT NOT NULL,
    content         TEXT NOT NULL,
    kind            TEXT NOT NULL,               -- text | emoji | file | voice | system
    parent_id       TEXT,                        -- nullable FK -> messages(id), threaded replies
    metadata        TEXT NOT NULL DEFAULT '{}',  -- JSON object
    is_edited       INTEGER NOT NULL DEFAULT 0,
    edited_at       TEXT,
    is_deleted      INTEGER NOT NULL DEFAULT 0,  -- soft delete, row never removed
    deleted_at      TEXT,
    created_at      TEXT NOT NULL,               -- ISO-8601; rowid breaks ties

    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
    FOREIGN KEY (parent_id) REFERENCES messages(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_ts
    ON messages(conversation_id, created_at);

-- ----------------------------------------------------------------
-- Reactions (one active reaction per user per message)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS message_reactions (
    message_id TEXT NOT NULL,                    -- FK -> messages(id)
    user_id    TEXT NOT NULL,
    emoji      TEXT NOT NULL,                    -- emoji character(s)
    created_at TEXT NOT NULL,

    PRIMARY KEY (message_id, user_id),
    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Read receipts
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS read_receipts (
    message_id TEXT NOT NULL,                    -- FK -> messages(id)
    user_id    TEXT NOT NULL,
    read_at    TEXT NOT NULL,

    PRIMARY KEY (message_id, user_id),
    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_receipts_user ON read_receipts(user_id);

-- ----------------------------------------------------------------
-- Presence (one row per user, advisory)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS presence (
    user_id   TEXT PRIMARY KEY NOT NULL,
    status    TEXT NOT NULL DEFAULT 'offline',   -- online | away | busy | offline
    typing_in TEXT,                              -- nullable conversation id
    metadata  TEXT NOT NULL DEFAULT '{}',
    last_seen TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Notification preferences (one row per user)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS notification_preferences (
    user_id         TEXT PRIMARY KEY NOT NULL,
    email_enabled   INTEGER NOT NULL DEFAULT 1,
    push_enabled    INTEGER NOT NULL DEFAULT 1,
    desktop_enabled INTEGER NOT NULL DEFAULT 1,
    sound_enabled   INTEGER NOT NULL DEFAULT 1,
    quiet_start     INTEGER,                     -- minutes since midnight UTC
    quiet_end       INTEGER,
    muted           TEXT NOT NULL DEFAULT '[]',  -- JSON array of conversation ids
    metadata        TEXT NOT NULL DEFAULT '{}',
    updated_at      TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
