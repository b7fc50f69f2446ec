//! In-memory store fakes. Same contracts as the SQLite implementations,
//! backed by mutex-guarded maps; used by the service unit tests and the
//! HTTP integration tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use parley_types::models::{Room, SessionUser};

use crate::models::{NewUser, UserRecord};
use crate::traits::{ConversationStore, CredentialStore, SessionStore, StoreError};

#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<CredentialInner>,
}

#[derive(Default)]
struct CredentialInner {
    users: Vec<UserRecord>,
    rooms: Vec<Room>,
    next_id: i64,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rooms(rooms: Vec<Room>) -> Self {
        let store = Self::default();
        store.inner.lock().unwrap().rooms = rooms;
        store
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn create_user(&self, new_user: &NewUser) -> Result<UserRecord, StoreError> {
        let mut inner = self.inner.lock().unwrap();

        if inner
            .users
            .iter()
            .any(|u| u.username == new_user.username || u.email == new_user.email)
        {
            return Err(StoreError::Conflict("username or email taken".into()));
        }

        inner.next_id += 1;
        let record = UserRecord {
            user_id: inner.next_id,
            username: new_user.username.clone(),
            email: new_user.email.clone(),
            password_hash: new_user.password_hash.clone(),
            external_id: new_user.external_id.clone(),
            created_on: "now".into(),
            last_login: "now".into(),
        };
        inner.users.push(record.clone());
        Ok(record)
    }

    fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .iter()
            .find(|u| u.username == username || u.email == email)
            .cloned())
    }

    fn find_by_credentials(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<Vec<UserRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .iter()
            .filter(|u| u.username == username && u.password_hash == password_hash)
            .cloned()
            .collect())
    }

    fn touch_last_login(&self, _user_id: i64) -> Result<(), StoreError> {
        Ok(())
    }

    fn list_rooms(&self) -> Result<Vec<Room>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut rooms = inner.rooms.clone();
        rooms.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rooms)
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, (SessionUser, Instant)>>,
    roster: Mutex<BTreeMap<i64, SessionUser>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn set(&self, token: &str, user: &SessionUser, ttl: Duration) -> Result<(), StoreError> {
        self.sessions
            .lock()
            .unwrap()
            .insert(token.to_string(), (user.clone(), Instant::now() + ttl));
        Ok(())
    }

    fn get(&self, token: &str) -> Result<Option<SessionUser>, StoreError> {
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.get(token) {
            Some((user, deadline)) if Instant::now() < *deadline => Ok(Some(user.clone())),
            Some(_) => {
                sessions.remove(token);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn roster_insert(&self, user: &SessionUser) -> Result<(), StoreError> {
        self.roster.lock().unwrap().insert(user.id, user.clone());
        Ok(())
    }

    fn roster_all(&self) -> Result<Vec<SessionUser>, StoreError> {
        Ok(self.roster.lock().unwrap().values().cloned().collect())
    }
}

#[derive(Default)]
pub struct MemoryConversationStore {
    lists: Mutex<HashMap<String, ConversationList>>,
}

struct ConversationList {
    entries: Vec<String>,
    deadline: Option<Instant>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn is_expired(list: &ConversationList) -> bool {
    matches!(list.deadline, Some(d) if Instant::now() >= d)
}

impl ConversationStore for MemoryConversationStore {
    fn append(&self, key: &str, entry: &str) -> Result<(), StoreError> {
        let mut lists = self.lists.lock().unwrap();
        let list = lists.entry(key.to_string()).or_insert(ConversationList {
            entries: Vec::new(),
            deadline: None,
        });
        if is_expired(list) {
            list.entries.clear();
            list.deadline = None;
        }
        list.entries.push(entry.to_string());
        Ok(())
    }

    fn entries(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut lists = self.lists.lock().unwrap();
        match lists.get(key) {
            Some(list) if !is_expired(list) => Ok(list.entries.clone()),
            Some(_) => {
                lists.remove(key);
                Ok(Vec::new())
            }
            None => Ok(Vec::new()),
        }
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut lists = self.lists.lock().unwrap();
        if let Some(list) = lists.get_mut(key) {
            list.deadline = Some(Instant::now() + ttl);
        }
        Ok(())
    }
}
