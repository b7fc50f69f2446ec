pub mod conversations;
pub mod credentials;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod sessions;
pub mod traits;

pub use conversations::SqliteConversationStore;
pub use credentials::SqliteCredentialStore;
pub use sessions::SqliteSessionStore;
pub use traits::{ConversationStore, CredentialStore, SessionStore, StoreError};

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// Shared SQLite handle. All three store implementations borrow the same
/// connection through `with_conn`; callers are expected to run store
/// operations off the async runtime (they block on the mutex).
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> std::result::Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> std::result::Result<T, StoreError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Backend(format!("DB lock poisoned: {}", e)))?;
        f(&conn)
    }
}
