use std::time::Duration;

use thiserror::Error;

use parley_types::models::{Room, SessionUser};

use crate::models::{NewUser, UserRecord};

#[derive(Error, Debug)]
pub enum StoreError {
    /// Uniqueness violated. The register existence check is not
    /// transactional, so a concurrent insert can land here; callers treat
    /// it the same as a failed pre-check.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, msg)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict(msg.clone().unwrap_or_else(|| e.to_string()))
            }
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

/// Relational account/room store. Rooms are reference data created
/// out-of-band (or by migration seed) and read-only here.
pub trait CredentialStore: Send + Sync {
    fn create_user(&self, new_user: &NewUser) -> Result<UserRecord, StoreError>;

    fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<UserRecord>, StoreError>;

    /// All rows matching username + password digest. Login requires exactly
    /// one; the caller decides what zero or several means.
    fn find_by_credentials(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<Vec<UserRecord>, StoreError>;

    fn touch_last_login(&self, user_id: i64) -> Result<(), StoreError>;

    /// All rooms, name ascending.
    fn list_rooms(&self) -> Result<Vec<Room>, StoreError>;
}

/// Token → user-snapshot store with TTL, plus the no-expiry roster mapping.
pub trait SessionStore: Send + Sync {
    fn set(&self, token: &str, user: &SessionUser, ttl: Duration) -> Result<(), StoreError>;

    /// `None` for unknown and expired tokens alike.
    fn get(&self, token: &str) -> Result<Option<SessionUser>, StoreError>;

    fn roster_insert(&self, user: &SessionUser) -> Result<(), StoreError>;

    fn roster_all(&self) -> Result<Vec<SessionUser>, StoreError>;
}

/// Ordered list store for serialized messages, keyed by conversation key.
/// Appends are tail inserts, so storage order is chronological per writer.
pub trait ConversationStore: Send + Sync {
    fn append(&self, key: &str, entry: &str) -> Result<(), StoreError>;

    /// Full list in storage order. Empty for unknown and expired keys.
    fn entries(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// (Re)set the key's deadline. Called after every append; losing this
    /// call leaves the list without a refreshed deadline, which is accepted.
    fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;
}
