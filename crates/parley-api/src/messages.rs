use std::sync::Arc;
use std::time::Duration;

use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{error, warn};

use parley_store::{ConversationStore, CredentialStore, SessionStore};
use parley_types::api::{
    DirectMessagesQuery, MessageResponse, MessagesResponse, RoomMessagesQuery, SendDirectRequest,
    SendRoomRequest,
};
use parley_types::models::{default_kind, Message, PublicUser, Room, SessionUser};

use crate::auth::AppState;
use crate::error::ApiError;

/// Conversation lists die a week after their last message.
const CONVERSATION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Symmetric key for a user pair: ids sorted ascending, so both
/// participants land on the same list no matter who is sending.
pub fn conversation_key(a: i64, b: i64) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("msg:{}:{}", lo, hi)
}

/// Rooms are a single-sided namespace; no symmetry needed.
pub fn room_key(room_id: i64) -> String {
    format!("room:{}:messages", room_id)
}

fn next_message_id() -> String {
    format!(
        "msg_{}_{:08x}",
        Utc::now().timestamp_millis(),
        rand::random::<u32>()
    )
}

/// Message history plus the roster/room listings. All state lives in the
/// injected stores; the service itself is stateless.
#[derive(Clone)]
pub struct MessagingService {
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    conversations: Arc<dyn ConversationStore>,
}

impl MessagingService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        conversations: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            credentials,
            sessions,
            conversations,
        }
    }

    pub fn send_direct(
        &self,
        sender: &SessionUser,
        recipient_id: Option<i64>,
        content: &str,
        kind: Option<String>,
    ) -> Result<Message, ApiError> {
        let recipient_id = recipient_id
            .ok_or_else(|| ApiError::Validation("recipientId is required".to_string()))?;
        let content = non_empty(content)?;

        let message = Message {
            id: next_message_id(),
            sender_id: sender.id,
            sender_username: sender.username.clone(),
            recipient_id: Some(recipient_id),
            room_id: None,
            content,
            kind: kind.unwrap_or_else(default_kind),
            timestamp: Utc::now(),
            read: false,
        };

        self.store(&conversation_key(sender.id, recipient_id), message)
    }

    pub fn list_direct(
        &self,
        caller: &SessionUser,
        recipient_id: Option<i64>,
    ) -> Result<Vec<Message>, ApiError> {
        let recipient_id = recipient_id
            .ok_or_else(|| ApiError::Validation("recipientId is required".to_string()))?;

        self.read(&conversation_key(caller.id, recipient_id))
    }

    pub fn send_room(
        &self,
        sender: &SessionUser,
        room_id: Option<i64>,
        content: &str,
        kind: Option<String>,
    ) -> Result<Message, ApiError> {
        let room_id =
            room_id.ok_or_else(|| ApiError::Validation("roomId is required".to_string()))?;
        let content = non_empty(content)?;

        let message = Message {
            id: next_message_id(),
            sender_id: sender.id,
            sender_username: sender.username.clone(),
            recipient_id: None,
            room_id: Some(room_id),
            content,
            kind: kind.unwrap_or_else(default_kind),
            timestamp: Utc::now(),
            read: false,
        };

        // No membership check: any authenticated user may write any room.
        self.store(&room_key(room_id), message)
    }

    pub fn list_room(
        &self,
        _caller: &SessionUser,
        room_id: Option<i64>,
    ) -> Result<Vec<Message>, ApiError> {
        let room_id =
            room_id.ok_or_else(|| ApiError::Validation("roomId is required".to_string()))?;

        self.read(&room_key(room_id))
    }

    /// Everyone on the roster except the caller.
    pub fn list_users(&self, caller: &SessionUser) -> Result<Vec<PublicUser>, ApiError> {
        Ok(self
            .sessions
            .roster_all()?
            .into_iter()
            .filter(|u| u.id != caller.id)
            .map(|u| u.public())
            .collect())
    }

    pub fn list_rooms(&self) -> Result<Vec<Room>, ApiError> {
        Ok(self.credentials.list_rooms()?)
    }

    fn store(&self, key: &str, message: Message) -> Result<Message, ApiError> {
        let entry = serde_json::to_string(&message)
            .map_err(|e| ApiError::Internal(format!("serialize message: {}", e)))?;

        self.conversations.append(key, &entry)?;

        // Best-effort: a lost refresh just leaves the old deadline in place.
        if let Err(e) = self.conversations.expire(key, CONVERSATION_TTL) {
            warn!("TTL refresh failed for {}: {}", key, e);
        }

        Ok(message)
    }

    /// Storage order is tail-insert, already chronological — no reversal.
    fn read(&self, key: &str) -> Result<Vec<Message>, ApiError> {
        let raw = self.conversations.entries(key)?;

        let mut messages = Vec::with_capacity(raw.len());
        for entry in raw {
            match serde_json::from_str::<Message>(&entry) {
                Ok(message) => messages.push(message),
                Err(e) => warn!("Skipping unparseable entry in {}: {}", key, e),
            }
        }
        Ok(messages)
    }
}

fn non_empty(content: &str) -> Result<String, ApiError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ApiError::Validation("content is required".to_string()));
    }
    Ok(trimmed.to_string())
}

// -- Handlers --

pub async fn send_direct(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Json(req): Json<SendDirectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let messaging = state.messaging.clone();
    let message = tokio::task::spawn_blocking(move || {
        messaging.send_direct(&user, req.recipient_id, &req.content, req.kind)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal("task failed".to_string())
    })??;

    Ok((StatusCode::CREATED, Json(MessageResponse { message })))
}

pub async fn list_direct(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Query(query): Query<DirectMessagesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let messaging = state.messaging.clone();
    let messages =
        tokio::task::spawn_blocking(move || messaging.list_direct(&user, query.recipient_id))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal("task failed".to_string())
            })??;

    Ok(Json(MessagesResponse { messages }))
}

pub async fn send_room(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Json(req): Json<SendRoomRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let messaging = state.messaging.clone();
    let message = tokio::task::spawn_blocking(move || {
        messaging.send_room(&user, req.room_id, &req.content, req.kind)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal("task failed".to_string())
    })??;

    Ok((StatusCode::CREATED, Json(MessageResponse { message })))
}

pub async fn list_room(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Query(query): Query<RoomMessagesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let messaging = state.messaging.clone();
    let messages = tokio::task::spawn_blocking(move || messaging.list_room(&user, query.room_id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal("task failed".to_string())
        })??;

    Ok(Json(MessagesResponse { messages }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_store::memory::{
        MemoryConversationStore, MemoryCredentialStore, MemorySessionStore,
    };

    fn harness() -> (MessagingService, Arc<MemoryConversationStore>) {
        let conversations = Arc::new(MemoryConversationStore::new());
        let service = MessagingService::new(
            Arc::new(MemoryCredentialStore::with_rooms(vec![
                Room {
                    id: 2,
                    name: "offtopic".into(),
                    description: None,
                },
                Room {
                    id: 1,
                    name: "general".into(),
                    description: Some("Open room for everyone".into()),
                },
            ])),
            Arc::new(MemorySessionStore::new()),
            conversations.clone(),
        );
        (service, conversations)
    }

    fn user(id: i64, username: &str) -> SessionUser {
        SessionUser {
            id,
            username: username.into(),
            email: format!("{}@x.com", username),
            external_id: format!("ext-{}", id),
        }
    }

    #[test]
    fn conversation_key_is_symmetric() {
        assert_eq!(conversation_key(1, 2), conversation_key(2, 1));
        assert_eq!(conversation_key(1, 2), "msg:1:2");
        assert_eq!(conversation_key(42, 7), "msg:7:42");
        assert_eq!(conversation_key(5, 5), "msg:5:5");
        assert_eq!(room_key(9), "room:9:messages");
    }

    #[test]
    fn send_then_list_from_either_side() {
        let (service, _) = harness();
        let alice = user(1, "alice");
        let bob = user(2, "bob");

        let sent = service
            .send_direct(&alice, Some(bob.id), "hi", None)
            .unwrap();
        assert_eq!(sent.sender_id, alice.id);
        assert_eq!(sent.recipient_id, Some(bob.id));
        assert_eq!(sent.kind, "text");
        assert!(!sent.read);

        // Bob reads the same conversation through his side of the pair.
        let seen = service.list_direct(&bob, Some(alice.id)).unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id, sent.id);
        assert_eq!(seen[0].content, "hi");

        let mine = service.list_direct(&alice, Some(bob.id)).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, sent.id);
    }

    #[test]
    fn history_is_chronological_oldest_first() {
        let (service, _) = harness();
        let alice = user(1, "alice");
        let bob = user(2, "bob");

        service.send_direct(&alice, Some(2), "one", None).unwrap();
        service.send_direct(&bob, Some(1), "two", None).unwrap();
        service.send_direct(&alice, Some(2), "three", None).unwrap();

        let history = service.list_direct(&alice, Some(2)).unwrap();
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
        assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn content_is_trimmed_and_whitespace_rejected() {
        let (service, conversations) = harness();
        let alice = user(1, "alice");

        let err = service.send_direct(&alice, Some(2), "   \n\t", None).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(conversations.entries("msg:1:2").unwrap().is_empty());

        let sent = service.send_direct(&alice, Some(2), "  hello  ", None).unwrap();
        assert_eq!(sent.content, "hello");
    }

    #[test]
    fn missing_recipient_is_validation_error() {
        let (service, _) = harness();
        let alice = user(1, "alice");

        assert!(matches!(
            service.send_direct(&alice, None, "hi", None),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            service.list_direct(&alice, None),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            service.send_room(&alice, None, "hi", None),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn unparseable_entries_are_skipped() {
        let (service, conversations) = harness();
        let alice = user(1, "alice");

        service.send_direct(&alice, Some(2), "kept", None).unwrap();
        conversations.append("msg:1:2", "not json {").unwrap();
        service.send_direct(&alice, Some(2), "also kept", None).unwrap();

        let history = service.list_direct(&alice, Some(2)).unwrap();
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["kept", "also kept"]);
    }

    #[test]
    fn room_messages_are_shared_by_all_users() {
        let (service, _) = harness();
        let alice = user(1, "alice");
        let carol = user(3, "carol");

        let sent = service.send_room(&alice, Some(1), "hello room", None).unwrap();
        assert_eq!(sent.room_id, Some(1));
        assert_eq!(sent.recipient_id, None);

        // Carol never joined anything; room access is unrestricted.
        let seen = service.list_room(&carol, Some(1)).unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].content, "hello room");

        assert!(service.list_room(&carol, Some(99)).unwrap().is_empty());
    }

    #[test]
    fn list_users_excludes_caller() {
        let (service, _) = harness();
        let alice = user(1, "alice");
        let bob = user(2, "bob");

        service.sessions.roster_insert(&alice).unwrap();
        service.sessions.roster_insert(&bob).unwrap();

        let seen_by_alice = service.list_users(&alice).unwrap();
        assert_eq!(seen_by_alice.len(), 1);
        assert_eq!(seen_by_alice[0].username, "bob");

        let seen_by_bob = service.list_users(&bob).unwrap();
        assert_eq!(seen_by_bob.len(), 1);
        assert_eq!(seen_by_bob[0].username, "alice");
    }

    #[test]
    fn rooms_come_back_name_ordered() {
        let (service, _) = harness();
        let rooms = service.list_rooms().unwrap();
        let names: Vec<_> = rooms.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["general", "offtopic"]);
    }

    #[test]
    fn stored_entry_uses_wire_field_names() {
        let (service, conversations) = harness();
        let alice = user(1, "alice");

        service.send_direct(&alice, Some(2), "hi", Some("image".into())).unwrap();

        let raw = conversations.entries("msg:1:2").unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw[0]).unwrap();
        assert_eq!(value["senderId"], 1);
        assert_eq!(value["senderUsername"], "alice");
        assert_eq!(value["recipientId"], 2);
        assert_eq!(value["type"], "image");
        assert_eq!(value["read"], false);
        assert!(value.get("roomId").is_none());
    }
}
