use std::sync::Arc;

use rusqlite::Connection;

use parley_types::models::Room;

use crate::models::{NewUser, UserRecord};
use crate::traits::{CredentialStore, StoreError};
use crate::Database;

/// SQLite-backed account/room store.
pub struct SqliteCredentialStore {
    db: Arc<Database>,
}

impl SqliteCredentialStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl CredentialStore for SqliteCredentialStore {
    fn create_user(&self, new_user: &NewUser) -> Result<UserRecord, StoreError> {
        self.db.with_conn(|conn| {
            // A UNIQUE violation here surfaces as StoreError::Conflict —
            // the fallback path when two registrations race the pre-check.
            conn.execute(
                "INSERT INTO users (username, email, password, external_id)
                 VALUES (?1, ?2, ?3, ?4)",
                (
                    &new_user.username,
                    &new_user.email,
                    &new_user.password_hash,
                    &new_user.external_id,
                ),
            )?;

            let user_id = conn.last_insert_rowid();
            query_user_by_id(conn, user_id)?
                .ok_or_else(|| StoreError::Backend(format!("inserted user {} not found", user_id)))
        })
    }

    fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, username, email, password, external_id, created_on, last_login
                 FROM users WHERE username = ?1 OR email = ?2",
            )?;

            let row = stmt
                .query_row((username, email), user_from_row)
                .optional()?;

            Ok(row)
        })
    }

    fn find_by_credentials(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<Vec<UserRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, username, email, password, external_id, created_on, last_login
                 FROM users WHERE username = ?1 AND password = ?2",
            )?;

            let rows = stmt
                .query_map((username, password_hash), user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    fn touch_last_login(&self, user_id: i64) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET last_login = datetime('now') WHERE user_id = ?1",
                [user_id],
            )?;
            Ok(())
        })
    }

    fn list_rooms(&self) -> Result<Vec<Room>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT room_id, name, description FROM rooms ORDER BY name")?;

            let rows = stmt
                .query_map([], |row| {
                    Ok(Room {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn user_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<UserRecord, rusqlite::Error> {
    Ok(UserRecord {
        user_id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        external_id: row.get(4)?,
        created_on: row.get(5)?,
        last_login: row.get(6)?,
    })
}

fn query_user_by_id(conn: &Connection, user_id: i64) -> Result<Option<UserRecord>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT user_id, username, email, password, external_id, created_on, last_login
         FROM users WHERE user_id = ?1",
    )?;

    let row = stmt.query_row([user_id], user_from_row).optional()?;

    Ok(row)
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, StoreError>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, StoreError> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
