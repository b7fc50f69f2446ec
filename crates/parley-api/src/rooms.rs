use axum::{Json, extract::State, response::IntoResponse};
use tracing::error;

use parley_types::api::RoomsResponse;

use crate::auth::AppState;
use crate::error::ApiError;

pub async fn list_rooms(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let messaging = state.messaging.clone();
    let rooms = tokio::task::spawn_blocking(move || messaging.list_rooms())
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal("task failed".to_string())
        })??;

    Ok(Json(RoomsResponse { rooms }))
}
