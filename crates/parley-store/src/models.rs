/// Database row types — these map directly to SQLite rows.
/// Distinct from the parley-types API models to keep the store layer
/// independent of the wire format.

pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub external_id: String,
}

#[derive(Clone, Debug)]
pub struct UserRecord {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub external_id: String,
    pub created_on: String,
    pub last_login: String,
}
