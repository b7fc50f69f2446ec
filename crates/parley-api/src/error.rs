use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

use parley_store::StoreError;
use parley_types::api::ErrorBody;

/// Service-level error taxonomy. Every variant maps to a status code and a
/// machine-readable body; internal detail goes to the log, never to the
/// client.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    /// Bad credentials on login.
    #[error("{0}")]
    Unauthorized(String),

    /// Missing, unknown or expired session token.
    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Conflict(String),

    /// Reserved for missing recipient/room lookups.
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "INVALID_DATA",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Unauthenticated(_) => "SESSION_EXPIRED",
            ApiError::Conflict(_) => "USER_EXISTS",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => {
                ApiError::Conflict("username or email already taken".to_string())
            }
            StoreError::Backend(msg) => ApiError::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::Internal(detail) => {
                error!("Internal error: {}", detail);
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            code: self.code().to_string(),
            message,
        };

        (self.status(), Json(body)).into_response()
    }
}
