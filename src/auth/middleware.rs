// Authentication middleware for protected routes

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::{error::AuthError, service::AuthService};
use crate::db::TxBackend;

/// Header carrying the access token; `Authorization: Bearer` is accepted too
pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";

/// Caller identity established by [`require_auth`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .copied()
            .ok_or_else(|| AuthError::Unauthorized("Missing authentication token".to_string()))
    }
}

/// Pulls the access token out of the request headers
pub fn extract_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    if let Some(value) = headers.get(ACCESS_TOKEN_HEADER) {
        let token = value
            .to_str()
            .map_err(|_| AuthError::Unauthorized("Invalid access token header".to_string()))?
            .trim();
        if token.is_empty() {
            return Err(AuthError::Unauthorized("Missing authentication token".to_string()));
        }
        return Ok(token);
    }

    let auth_header = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AuthError::Unauthorized("Missing authentication token".to_string()))?
        .to_str()
        .map_err(|_| AuthError::Unauthorized("Invalid Authorization header".to_string()))?;

    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AuthError::Unauthorized("Invalid Authorization header".to_string()))
}

/// Middleware for protected routes
///
/// Verifies the access token and stores the caller in the request
/// extensions for [`AuthenticatedUser`]. Routes without this layer are
/// reachable anonymously.
pub async fn require_auth<B: TxBackend>(
    State(service): State<Arc<AuthService<B>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let endpoint = request.uri().path().to_string();

    let user_id = match extract_token(request.headers()) {
        Ok(token) => service.parse_token(token)?,
        Err(err) => {
            warn!("Rejected request to protected endpoint {}: {}", endpoint, err);
            return Err(err);
        }
    };

    debug!(%user_id, endpoint = %endpoint, "Request authenticated");
    request.extensions_mut().insert(AuthenticatedUser { user_id });
    Ok(next.run(request).await)
}
