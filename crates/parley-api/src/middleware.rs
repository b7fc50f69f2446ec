use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::error;

use crate::auth::AppState;
use crate::error::ApiError;

/// Extract the bearer token from the Authorization header, resolve it
/// through the session store, and stash the user snapshot as an extension
/// for the handlers downstream.
pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned);

    let auth = state.auth.clone();
    let user = tokio::task::spawn_blocking(move || auth.verify(token.as_deref()))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal("task failed".to_string())
        })??;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
