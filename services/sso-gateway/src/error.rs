//! Service-specific error types

use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use sso::AuthError;
use thiserror::Error;

/// Per-request failures, rendered as JSON error bodies.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The authentication pipeline rejected the credentials
    #[error("{0}")]
    Login(AuthError),

    #[error("missing or malformed bearer token")]
    MissingSession,

    #[error("session expired or unknown")]
    InvalidSession,

    #[error("user {0} no longer exists")]
    UserGone(u64),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Login(_) | ApiError::MissingSession | ApiError::InvalidSession => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::UserGone(_) => StatusCode::NOT_FOUND,
        }
    }

    fn code(&self) -> &str {
        match self {
            ApiError::Login(e) => &e.code,
            ApiError::MissingSession => "missing_session",
            ApiError::InvalidSession => "invalid_session",
            ApiError::UserGone(_) => "user_not_found",
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Login(e) => e.message.clone(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": self.code(),
                "message": self.message(),
            }
        });
        (
            self.status(),
            [(CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}
