// HTTP handlers for authentication endpoints

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use validator::Validate;

use crate::auth::{
    error::AuthError,
    middleware::AuthenticatedUser,
    models::{LoginRequest, LogoutRequest, RefreshRequest, RegisterRequest, TokenPair, UserResponse},
    service::AuthService,
};
use crate::db::TxBackend;

/// Register a new user
/// POST /api/auth/register
pub async fn register_handler<B: TxBackend>(
    State(service): State<Arc<AuthService<B>>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AuthError> {
    let user = service.register(request).await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// Login a user
/// POST /api/auth/login
pub async fn login_handler<B: TxBackend>(
    State(service): State<Arc<AuthService<B>>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenPair>, AuthError> {
    request.validate()?;
    let pair = service.login(&request.email, &request.password).await?;
    Ok(Json(pair))
}

/// Exchange a token pair for a new one
/// POST /api/auth/refresh
pub async fn refresh_handler<B: TxBackend>(
    State(service): State<Arc<AuthService<B>>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, AuthError> {
    request.validate()?;
    let pair = service.refresh(&TokenPair::from(request)).await?;
    Ok(Json(pair))
}

/// Revoke a refresh token (protected endpoint)
/// POST /api/auth/logout
pub async fn logout_handler<B: TxBackend>(
    State(service): State<Arc<AuthService<B>>>,
    user: AuthenticatedUser,
    Json(request): Json<LogoutRequest>,
) -> Result<StatusCode, AuthError> {
    request.validate()?;
    tracing::debug!(user_id = %user.user_id, "Logout requested");
    service.logout(&request.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Get current user information (protected endpoint)
/// GET /api/users/me
pub async fn me_handler<B: TxBackend>(
    State(service): State<Arc<AuthService<B>>>,
    user: AuthenticatedUser,
) -> Result<Json<UserResponse>, AuthError> {
    let user = service.current_user(user.user_id).await?;
    Ok(Json(UserResponse::from(user)))
}
