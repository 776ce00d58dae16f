// Authentication error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::db::StoreError;
use crate::error::ErrorResponse;

/// Errors returned by the auth operations
///
/// Messages carried by `Internal` are logged but never sent to clients.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed input, bad credentials, or a token that cannot be used
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Missing or invalid access token on a protected route
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Storage, signing or hashing failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AuthError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::AlreadyExists(_) => StatusCode::CONFLICT,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::InvalidArgument(_) => "INVALID_ARGUMENT",
            AuthError::Unauthorized(_) => "UNAUTHORIZED",
            AuthError::NotFound(_) => "NOT_FOUND",
            AuthError::AlreadyExists(_) => "ALREADY_EXISTS",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get a descriptive error message for this error
    /// This message is safe to send to clients (no sensitive data)
    pub fn error_message(&self) -> String {
        match self {
            AuthError::InvalidArgument(msg)
            | AuthError::Unauthorized(msg)
            | AuthError::NotFound(msg)
            | AuthError::AlreadyExists(msg) => msg.clone(),
            AuthError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match &self {
            AuthError::Internal(msg) => error!("Internal error in auth: {}", msg),
            AuthError::Unauthorized(msg) => warn!("Unauthorized request: {}", msg),
            AuthError::AlreadyExists(msg) => warn!("Conflict: {}", msg),
            AuthError::InvalidArgument(msg) | AuthError::NotFound(msg) => {
                debug!("Rejected request: {}", msg)
            }
        }

        let body = ErrorResponse::new(self.error_code(), self.error_message());
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AuthError::NotFound("Record not found".to_string()),
            StoreError::UniqueViolation(constraint) => AuthError::AlreadyExists(constraint),
            other => AuthError::Internal(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AuthError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AuthError::InvalidArgument(format!("Request validation failed: {}", errors))
    }
}
