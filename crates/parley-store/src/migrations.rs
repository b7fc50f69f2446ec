use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            user_id      INTEGER PRIMARY KEY AUTOINCREMENT,
            username     TEXT NOT NULL UNIQUE,
            email        TEXT NOT NULL UNIQUE,
            password     TEXT NOT NULL,
            external_id  TEXT NOT NULL,
            created_on   TEXT NOT NULL DEFAULT (datetime('now')),
            last_login   TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS rooms (
            room_id      INTEGER PRIMARY KEY AUTOINCREMENT,
            name         TEXT NOT NULL UNIQUE,
            description  TEXT
        );

        -- Session tokens with absolute expiry (unix seconds). Expired rows
        -- are treated as absent and purged lazily on lookup.
        CREATE TABLE IF NOT EXISTS sessions (
            token       TEXT PRIMARY KEY,
            snapshot    TEXT NOT NULL,
            expires_at  INTEGER NOT NULL
        );

        -- Full-population user roster, one snapshot per user id, no expiry.
        CREATE TABLE IF NOT EXISTS roster (
            user_id   INTEGER PRIMARY KEY,
            snapshot  TEXT NOT NULL
        );

        -- Ordered conversation lists: entry_id gives tail-insert order
        -- within a key. Expiry lives in a side table, one deadline per key,
        -- refreshed on every append.
        CREATE TABLE IF NOT EXISTS conversation_entries (
            entry_id          INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_key  TEXT NOT NULL,
            entry             TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_conversation_entries_key
            ON conversation_entries(conversation_key, entry_id);

        CREATE TABLE IF NOT EXISTS conversation_expiry (
            conversation_key  TEXT PRIMARY KEY,
            expires_at        INTEGER NOT NULL
        );

        -- Seed the default room
        INSERT OR IGNORE INTO rooms (room_id, name, description)
            VALUES (1, 'general', 'Open room for everyone');
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
