use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::warn;

use parley_types::models::SessionUser;

use crate::credentials::OptionalExt;
use crate::traits::{SessionStore, StoreError};
use crate::Database;

/// SQLite-backed session/roster store. Snapshots are stored as JSON text;
/// expiry is an absolute unix-seconds deadline checked on every lookup.
pub struct SqliteSessionStore {
    db: Arc<Database>,
}

impl SqliteSessionStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl SessionStore for SqliteSessionStore {
    fn set(&self, token: &str, user: &SessionUser, ttl: Duration) -> Result<(), StoreError> {
        let snapshot = serde_json::to_string(user)
            .map_err(|e| StoreError::Backend(format!("serialize session snapshot: {}", e)))?;
        let expires_at = Utc::now().timestamp() + ttl.as_secs() as i64;

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO sessions (token, snapshot, expires_at)
                 VALUES (?1, ?2, ?3)",
                (token, &snapshot, expires_at),
            )?;
            Ok(())
        })
    }

    fn get(&self, token: &str) -> Result<Option<SessionUser>, StoreError> {
        let now = Utc::now().timestamp();

        self.db.with_conn(|conn| {
            let row: Option<(String, i64)> = conn
                .prepare("SELECT snapshot, expires_at FROM sessions WHERE token = ?1")?
                .query_row([token], |row| Ok((row.get(0)?, row.get(1)?)))
                .optional()?;

            let Some((snapshot, expires_at)) = row else {
                return Ok(None);
            };

            if expires_at <= now {
                // Expired tokens look absent; purge the row while we're here.
                conn.execute("DELETE FROM sessions WHERE token = ?1", [token])?;
                return Ok(None);
            }

            let user: SessionUser = serde_json::from_str(&snapshot).map_err(|e| {
                StoreError::Backend(format!("corrupt session snapshot for token: {}", e))
            })?;
            Ok(Some(user))
        })
    }

    fn roster_insert(&self, user: &SessionUser) -> Result<(), StoreError> {
        let snapshot = serde_json::to_string(user)
            .map_err(|e| StoreError::Backend(format!("serialize roster snapshot: {}", e)))?;

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO roster (user_id, snapshot) VALUES (?1, ?2)",
                (user.id, &snapshot),
            )?;
            Ok(())
        })
    }

    fn roster_all(&self) -> Result<Vec<SessionUser>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT snapshot FROM roster ORDER BY user_id")?;

            let snapshots = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut users = Vec::with_capacity(snapshots.len());
            for snapshot in snapshots {
                match serde_json::from_str::<SessionUser>(&snapshot) {
                    Ok(user) => users.push(user),
                    Err(e) => warn!("Skipping corrupt roster snapshot: {}", e),
                }
            }
            Ok(users)
        })
    }
}
