//! Auth error types and their HTTP responses.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use flightdeck_storage::StorageError;

/// Errors surfaced by authentication and authorization.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No usable credential on the request.
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// The credential failed validation (bad signature, malformed claims).
    #[error("Invalid token: {message}")]
    InvalidToken { message: String },

    /// The credential is valid but past its expiry.
    #[error("Token expired")]
    TokenExpired,

    /// The credential references an identity that no longer exists.
    #[error("Unknown identity")]
    UnknownIdentity,

    /// The resolved identity lacks the required permission.
    #[error("Permission denied: {permission}")]
    PermissionDenied { permission: String },

    /// The identity lookup itself failed.
    #[error("Identity lookup failed: {0}")]
    Storage(#[from] StorageError),
}

impl AuthError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    pub fn permission_denied(permission: impl Into<String>) -> Self {
        Self::PermissionDenied {
            permission: permission.into(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AuthError::Unauthorized { message } => (StatusCode::UNAUTHORIZED, message.clone()),
            AuthError::InvalidToken { message } => (StatusCode::UNAUTHORIZED, message.clone()),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "Token has expired".to_string()),
            AuthError::UnknownIdentity => {
                (StatusCode::UNAUTHORIZED, "Unknown identity".to_string())
            }
            AuthError::PermissionDenied { .. } => {
                (StatusCode::FORBIDDEN, "Permission denied".to_string())
            }
            AuthError::Storage(e) => {
                tracing::error!(error = %e, "Identity lookup failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Identity lookup failed".to_string(),
                )
            }
        };

        let mut headers = HeaderMap::new();
        if status == StatusCode::UNAUTHORIZED {
            headers.insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer"),
            );
        }

        (status, headers, Json(json!({ "message": message }))).into_response()
    }
}
