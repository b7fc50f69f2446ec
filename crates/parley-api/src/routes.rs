use axum::{
    Router,
    routing::{get, post},
};

use crate::auth::AppState;
use crate::middleware::require_session;
use crate::{auth, messages, rooms, users};

/// Public auth endpoints plus the session-guarded API surface.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .with_state(state.clone());

    let protected = Router::new()
        .route("/users", get(users::list_users))
        .route("/rooms", get(rooms::list_rooms))
        .route(
            "/messages",
            get(messages::list_direct).post(messages::send_direct),
        )
        .route(
            "/room-messages",
            get(messages::list_room).post(messages::send_room),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ))
        .with_state(state);

    public.merge(protected)
}
