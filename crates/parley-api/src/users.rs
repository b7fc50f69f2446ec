use axum::{Extension, Json, extract::State, response::IntoResponse};
use tracing::error;

use parley_types::api::UsersResponse;
use parley_types::models::SessionUser;

use crate::auth::AppState;
use crate::error::ApiError;

/// Roster listing for the contact picker. Deliberately unpaginated: the
/// deployments this serves stay well under a size where that matters.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> Result<impl IntoResponse, ApiError> {
    let messaging = state.messaging.clone();
    let users = tokio::task::spawn_blocking(move || messaging.list_users(&user))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal("task failed".to_string())
        })??;

    Ok(Json(UsersResponse { users }))
}
