//! v001 -- Initial schema creation.
//!
//! Identity tables (`users`, `profiles`, `files`) and the content tables
//! (`listings`, `chats`, `messages`, `comments`).

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id  INTEGER NOT NULL UNIQUE,     -- Telegram user id
    username     TEXT,
    first_name   TEXT,
    last_name    TEXT,
    locale       TEXT NOT NULL DEFAULT 'en',
    is_premium   INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    kind         TEXT NOT NULL DEFAULT 'telegram',
    created_at   TEXT NOT NULL,               -- RFC-3339
    last_login   TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Profiles (1:1 with users)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS profiles (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id    INTEGER NOT NULL UNIQUE,
    avatar     TEXT,
    bio        TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Files (per-user uploads)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS files (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id           INTEGER NOT NULL,
    external_owner_id INTEGER NOT NULL,
    filename          TEXT NOT NULL,
    original_filename TEXT NOT NULL,
    file_path         TEXT NOT NULL,
    file_size         INTEGER NOT NULL DEFAULT 0,
    mime_type         TEXT,
    uploaded_at       TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_files_user_id ON files(user_id);
CREATE INDEX IF NOT EXISTS idx_files_external_owner ON files(external_owner_id);

-- ----------------------------------------------------------------
-- Listings ("profiles" in the catalog). Ids are assigned max+1 by the
-- store, not by AUTOINCREMENT.
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS listings (
    id            INTEGER PRIMARY KEY NOT NULL,
    name          TEXT NOT NULL,
    age           INTEGER NOT NULL,
    gender        TEXT NOT NULL DEFAULT '',
    nationality   TEXT NOT NULL DEFAULT '',
    city          TEXT NOT NULL DEFAULT '',
    travel_cities TEXT NOT NULL DEFAULT '[]',  -- JSON array
    description   TEXT NOT NULL DEFAULT '',
    height        INTEGER,
    weight        INTEGER,
    chest         INTEGER,
    photos        TEXT NOT NULL,               -- JSON array, at least one
    visible       INTEGER NOT NULL DEFAULT 1,
    created_at    TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Chats: one per (listing, owner); a NULL owner is its own group.
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chats (
    id                   INTEGER PRIMARY KEY AUTOINCREMENT,
    listing_id           INTEGER NOT NULL,
    listing_name         TEXT NOT NULL,        -- snapshot at creation
    owner_external_id    INTEGER,
    last_read_message_id INTEGER NOT NULL DEFAULT 0,
    created_at           TEXT NOT NULL,

    FOREIGN KEY (listing_id) REFERENCES listings(id)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_chats_listing_owner
    ON chats(listing_id, IFNULL(owner_external_id, 0));
CREATE INDEX IF NOT EXISTS idx_chats_owner ON chats(owner_external_id);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_id      INTEGER NOT NULL,
    is_from_user INTEGER NOT NULL DEFAULT 0,
    is_system    INTEGER NOT NULL DEFAULT 0,
    text         TEXT,
    file_url     TEXT,
    file_type    TEXT,
    file_name    TEXT,
    created_at   TEXT NOT NULL,

    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_chat_id ON messages(chat_id, id);

-- ----------------------------------------------------------------
-- Comments
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS comments (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    listing_id  INTEGER NOT NULL,
    author_name TEXT NOT NULL DEFAULT 'Anonymous User',
    text        TEXT NOT NULL,
    created_at  TEXT NOT NULL,

    FOREIGN KEY (listing_id) REFERENCES listings(id)
);

CREATE INDEX IF NOT EXISTS idx_comments_listing_id ON comments(listing_id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
