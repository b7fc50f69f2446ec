use std::sync::Arc;
use std::time::Duration;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use sha2::{Digest, Sha256};
use tracing::{error, info};
use uuid::Uuid;

use parley_store::models::{NewUser, UserRecord};
use parley_store::{CredentialStore, SessionStore};
use parley_types::api::{AuthResponse, LoginRequest, RegisterRequest};
use parley_types::models::SessionUser;

use crate::error::ApiError;
use crate::messages::MessagingService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub auth: AuthService,
    pub messaging: MessagingService,
}

/// Sessions opened at registration are short-lived; a proper login earns
/// the longer one.
const REGISTER_SESSION_TTL: Duration = Duration::from_secs(60 * 60);
const LOGIN_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Credential checks and session lifecycle. Stores are injected so tests
/// can run against the in-memory fakes.
#[derive(Clone)]
pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
}

/// A freshly opened session: opaque bearer token plus the snapshot stored
/// under it.
#[derive(Debug)]
pub struct AuthSession {
    pub token: String,
    pub user: SessionUser,
}

impl AuthService {
    pub fn new(credentials: Arc<dyn CredentialStore>, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            credentials,
            sessions,
        }
    }

    pub fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, ApiError> {
        if username.trim().is_empty() || email.trim().is_empty() || password.trim().is_empty() {
            return Err(ApiError::Validation(
                "username, email and password are required".to_string(),
            ));
        }

        // Pre-insert existence check. Not transactional: a racing insert is
        // caught by the unique constraint and surfaces as the same Conflict.
        if self
            .credentials
            .find_by_username_or_email(username, email)?
            .is_some()
        {
            return Err(ApiError::Conflict(
                "username or email already taken".to_string(),
            ));
        }

        let record = self.credentials.create_user(&NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password_digest(username, password),
            external_id: Uuid::new_v4().to_string(),
        })?;

        info!("Registered user {} ({})", record.username, record.user_id);
        self.open_session(snapshot(record), REGISTER_SESSION_TTL)
    }

    pub fn login(&self, username: &str, password: &str) -> Result<AuthSession, ApiError> {
        if username.trim().is_empty() || password.trim().is_empty() {
            return Err(ApiError::Validation(
                "username and password are required".to_string(),
            ));
        }

        let mut matches = self
            .credentials
            .find_by_credentials(username, &password_digest(username, password))?;

        // Exactly one row or the credentials are no good: zero is a
        // mismatch, several is an ambiguous account state.
        if matches.len() != 1 {
            return Err(ApiError::Unauthorized(
                "invalid username or password".to_string(),
            ));
        }
        let record = matches.remove(0);

        self.credentials.touch_last_login(record.user_id)?;
        self.open_session(snapshot(record), LOGIN_SESSION_TTL)
    }

    /// Resolve a bearer token to its stored snapshot. Expired tokens look
    /// exactly like unknown ones.
    pub fn verify(&self, token: Option<&str>) -> Result<SessionUser, ApiError> {
        let token = token
            .ok_or_else(|| ApiError::Unauthenticated("missing bearer token".to_string()))?;

        self.sessions
            .get(token)?
            .ok_or_else(|| ApiError::Unauthenticated("session expired or unknown".to_string()))
    }

    fn open_session(&self, user: SessionUser, ttl: Duration) -> Result<AuthSession, ApiError> {
        let token = Uuid::new_v4().to_string();
        self.sessions.set(&token, &user, ttl)?;
        self.sessions.roster_insert(&user)?;
        Ok(AuthSession { token, user })
    }
}

/// base64(SHA-256(username ‖ password)) — the fixed digest the credential
/// rows carry.
pub fn password_digest(username: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(username.as_bytes());
    hasher.update(password.as_bytes());
    B64.encode(hasher.finalize())
}

fn snapshot(record: UserRecord) -> SessionUser {
    SessionUser {
        id: record.user_id,
        username: record.username,
        email: record.email,
        external_id: record.external_id,
    }
}

// -- Handlers --

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let auth = state.auth.clone();
    let session = tokio::task::spawn_blocking(move || {
        auth.register(&req.username, &req.email, &req.password)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal("task failed".to_string())
    })??;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token: session.token,
            user: session.user.public(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let auth = state.auth.clone();
    let session =
        tokio::task::spawn_blocking(move || auth.login(&req.username, &req.password))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal("task failed".to_string())
            })??;

    Ok(Json(AuthResponse {
        token: session.token,
        user: session.user.public(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_store::memory::{MemoryCredentialStore, MemorySessionStore};

    fn service() -> AuthService {
        AuthService::new(
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(MemorySessionStore::new()),
        )
    }

    #[test]
    fn register_returns_session_with_public_snapshot() {
        let auth = service();
        let session = auth.register("alice", "a@x.com", "secret1").unwrap();

        assert!(!session.token.is_empty());
        assert_eq!(session.user.username, "alice");
        assert_eq!(session.user.email, "a@x.com");
        assert!(!session.user.external_id.is_empty());
    }

    #[test]
    fn register_rejects_empty_fields() {
        let auth = service();
        for (u, e, p) in [("", "a@x.com", "pw"), ("alice", "", "pw"), ("alice", "a@x.com", "  ")] {
            let err = auth.register(u, e, p).unwrap_err();
            assert!(matches!(err, ApiError::Validation(_)), "{:?}", (u, e, p));
        }
    }

    #[test]
    fn duplicate_registration_conflicts() {
        let auth = service();
        auth.register("alice", "a@x.com", "secret1").unwrap();

        let same_name = auth.register("alice", "other@x.com", "pw").unwrap_err();
        assert!(matches!(same_name, ApiError::Conflict(_)));

        let same_email = auth.register("bob", "a@x.com", "pw").unwrap_err();
        assert!(matches!(same_email, ApiError::Conflict(_)));
    }

    #[test]
    fn login_succeeds_and_mints_fresh_tokens() {
        let auth = service();
        let registered = auth.register("alice", "a@x.com", "secret1").unwrap();

        let first = auth.login("alice", "secret1").unwrap();
        let second = auth.login("alice", "secret1").unwrap();

        assert_ne!(first.token, registered.token);
        assert_ne!(first.token, second.token);
        // Earlier tokens stay valid until their own expiry.
        assert!(auth.verify(Some(&first.token)).is_ok());
    }

    #[test]
    fn wrong_password_is_unauthorized() {
        let auth = service();
        auth.register("alice", "a@x.com", "secret1").unwrap();

        let err = auth.login("alice", "wrongpass").unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));

        let unknown = auth.login("nobody", "secret1").unwrap_err();
        assert!(matches!(unknown, ApiError::Unauthorized(_)));
    }

    #[test]
    fn verify_rejects_missing_and_unknown_tokens() {
        let auth = service();
        assert!(matches!(auth.verify(None), Err(ApiError::Unauthenticated(_))));
        assert!(matches!(
            auth.verify(Some("not-a-token")),
            Err(ApiError::Unauthenticated(_))
        ));

        let session = auth.register("alice", "a@x.com", "secret1").unwrap();
        let user = auth.verify(Some(&session.token)).unwrap();
        assert_eq!(user.id, session.user.id);
    }

    #[test]
    fn digest_is_stable_and_user_scoped() {
        assert_eq!(
            password_digest("alice", "secret1"),
            password_digest("alice", "secret1")
        );
        // Same password under a different username digests differently.
        assert_ne!(
            password_digest("alice", "secret1"),
            password_digest("bob", "secret1")
        );
    }
}
