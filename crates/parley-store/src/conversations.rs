use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rusqlite::Connection;

use crate::credentials::OptionalExt;
use crate::traits::{ConversationStore, StoreError};
use crate::Database;

/// SQLite-backed ordered-list store. `entry_id` preserves tail-insert
/// order within a key; each key carries at most one expiry deadline,
/// refreshed by `expire` after every append.
pub struct SqliteConversationStore {
    db: Arc<Database>,
}

impl SqliteConversationStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl ConversationStore for SqliteConversationStore {
    fn append(&self, key: &str, entry: &str) -> Result<(), StoreError> {
        let now = Utc::now().timestamp();

        self.db.with_conn(|conn| {
            // An append to an expired key starts a fresh list.
            if key_expired(conn, key, now)? {
                purge_key(conn, key)?;
            }

            conn.execute(
                "INSERT INTO conversation_entries (conversation_key, entry) VALUES (?1, ?2)",
                (key, entry),
            )?;
            Ok(())
        })
    }

    fn entries(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let now = Utc::now().timestamp();

        self.db.with_conn(|conn| {
            if key_expired(conn, key, now)? {
                purge_key(conn, key)?;
                return Ok(Vec::new());
            }

            let mut stmt = conn.prepare(
                "SELECT entry FROM conversation_entries
                 WHERE conversation_key = ?1 ORDER BY entry_id",
            )?;

            let rows = stmt
                .query_map([key], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;

            Ok(rows)
        })
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = Utc::now().timestamp() + ttl.as_secs() as i64;

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO conversation_expiry (conversation_key, expires_at)
                 VALUES (?1, ?2)",
                (key, expires_at),
            )?;
            Ok(())
        })
    }
}

fn key_expired(conn: &Connection, key: &str, now: i64) -> Result<bool, StoreError> {
    let deadline: Option<i64> = conn
        .prepare("SELECT expires_at FROM conversation_expiry WHERE conversation_key = ?1")?
        .query_row([key], |row| row.get(0))
        .optional()?;

    // No deadline yet means the key is young: expire() runs right after the
    // first append.
    Ok(matches!(deadline, Some(d) if d <= now))
}

fn purge_key(conn: &Connection, key: &str) -> Result<(), StoreError> {
    conn.execute(
        "DELETE FROM conversation_entries WHERE conversation_key = ?1",
        [key],
    )?;
    conn.execute(
        "DELETE FROM conversation_expiry WHERE conversation_key = ?1",
        [key],
    )?;
    Ok(())
}
