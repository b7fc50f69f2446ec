use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User snapshot held by the session store. Captured at login/registration
/// time and returned as-is by `verify` — it may lag the credential store
/// until the next login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Opaque id handed to the push-delivery service. Kept in the snapshot
    /// but never included in client-facing payloads.
    pub external_id: String,
}

impl SessionUser {
    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }
}

/// Client-facing user view. Password digest and external id stay server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A single stored message. Serialized to JSON for the conversation list;
/// the same shape goes over the wire.
///
/// Exactly one of `recipient_id` / `room_id` is set depending on whether
/// this is a direct or a room message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: i64,
    pub sender_username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<i64>,
    pub content: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    /// Present for interface compatibility; nothing updates it.
    #[serde(default)]
    pub read: bool,
}

pub fn default_kind() -> String {
    "text".to_string()
}
