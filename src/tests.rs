// HTTP tests for the auth endpoints
// The router runs against the in-memory store, so no database is required

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, Request, StatusCode},
};
use axum_test::TestServer;
use serde_json::json;
use tower::ServiceExt;

use crate::app::{create_router, memory_service};
use crate::auth::{password::fast_password_service, CredentialProvider, Credentials, TokenPair, UserResponse};
use crate::db::MemoryBackend;
use crate::error::ErrorResponse;

// ============================================================================
// Test Helpers
// ============================================================================

const EMAIL: &str = "a@x.com";
const PASSWORD: &str = "pw-secret-1";

fn test_credentials() -> Arc<CredentialProvider> {
    Arc::new(CredentialProvider::new(Credentials::from_secret(
        b"test_secret_key_for_testing_purposes",
    )))
}

fn create_test_app() -> (Arc<MemoryBackend>, TestServer) {
    let (backend, service) = memory_service(test_credentials(), fast_password_service());
    let server = TestServer::new(create_router(Arc::new(service))).unwrap();
    (backend, server)
}

fn access_header(token: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-access-token"),
        HeaderValue::from_str(token).unwrap(),
    )
}

async fn register(server: &TestServer) -> UserResponse {
    let response = server
        .post("/api/auth/register")
        .json(&json!({
            "email": EMAIL,
            "password": PASSWORD,
            "first_name": "Ada",
            "last_name": "Lovelace"
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    response.json()
}

async fn login(server: &TestServer) -> TokenPair {
    let response = server
        .post("/api/auth/login")
        .json(&json!({ "email": EMAIL, "password": PASSWORD }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    response.json()
}

// ============================================================================
// Register / Login
// ============================================================================

#[tokio::test]
async fn test_register_returns_profile() {
    let (_, server) = create_test_app();
    let user = register(&server).await;

    assert_eq!(user.email, EMAIL);
    assert_eq!(user.first_name, "Ada");
}

#[tokio::test]
async fn test_register_duplicate_email_conflict() {
    let (_, server) = create_test_app();
    register(&server).await;

    let response = server
        .post("/api/auth/register")
        .json(&json!({
            "email": EMAIL,
            "password": "other-pass-9",
            "first_name": "Other",
            "last_name": "User"
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    let body: ErrorResponse = response.json();
    assert_eq!(body.error_code, "ALREADY_EXISTS");
}

#[tokio::test]
async fn test_register_invalid_email_bad_request() {
    let (_, server) = create_test_app();
    let response = server
        .post("/api/auth/register")
        .json(&json!({
            "email": "not-an-email",
            "password": PASSWORD,
            "first_name": "Ada",
            "last_name": "Lovelace"
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = response.json();
    assert_eq!(body.error_code, "INVALID_ARGUMENT");
}

#[tokio::test]
async fn test_login_returns_token_pair() {
    let (backend, server) = create_test_app();
    register(&server).await;
    let pair = login(&server).await;

    let sessions = backend.snapshot().await.sessions;
    assert_eq!(sessions.len(), 1);
    assert!(sessions.values().any(|s| s.token == pair.refresh_token && s.is_active()));
}

#[tokio::test]
async fn test_login_wrong_password_bad_request() {
    let (_, server) = create_test_app();
    register(&server).await;

    let response = server
        .post("/api/auth/login")
        .json(&json!({ "email": EMAIL, "password": "wrong-pass-1" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = response.json();
    assert_eq!(body.message, "Invalid email or password");
}

// ============================================================================
// Refresh / Logout
// ============================================================================

#[tokio::test]
async fn test_refresh_rotates_and_rejects_replay() {
    let (_, server) = create_test_app();
    register(&server).await;
    let first = login(&server).await;

    let response = server.post("/api/auth/refresh").json(&first).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let second: TokenPair = response.json();
    assert_ne!(second.refresh_token, first.refresh_token);

    let replay = server.post("/api/auth/refresh").json(&first).await;
    assert_eq!(replay.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_logout_requires_access_token() {
    let (_, server) = create_test_app();
    register(&server).await;
    let pair = login(&server).await;

    let response = server
        .post("/api/auth/logout")
        .json(&json!({ "refresh_token": pair.refresh_token }))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_refresh_token() {
    let (_, server) = create_test_app();
    register(&server).await;
    let pair = login(&server).await;
    let (name, value) = access_header(&pair.access_token);

    let response = server
        .post("/api/auth/logout")
        .add_header(name, value)
        .json(&json!({ "refresh_token": pair.refresh_token }))
        .await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);

    let refresh = server.post("/api/auth/refresh").json(&pair).await;
    assert_eq!(refresh.status_code(), StatusCode::BAD_REQUEST);
}

// ============================================================================
// Protected routes
// ============================================================================

#[tokio::test]
async fn test_me_with_access_token_header() {
    let (_, server) = create_test_app();
    let registered = register(&server).await;
    let pair = login(&server).await;
    let (name, value) = access_header(&pair.access_token);

    let response = server.get("/api/users/me").add_header(name, value).await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let me: UserResponse = response.json();
    assert_eq!(me.id, registered.id);
}

#[tokio::test]
async fn test_me_with_bearer_token() {
    let (_, server) = create_test_app();
    register(&server).await;
    let pair = login(&server).await;

    let response = server
        .get("/api/users/me")
        .add_header(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", pair.access_token)).unwrap(),
        )
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_me_rejects_token_from_other_issuer() {
    let (_, server) = create_test_app();
    register(&server).await;

    let foreign = CredentialProvider::new(Credentials::from_secret(b"another_secret"))
        .generate_pair(uuid::Uuid::new_v4(), uuid::Uuid::new_v4(), chrono::Utc::now())
        .unwrap();
    let (name, value) = access_header(&foreign.access_token);

    let response = server.get("/api/users/me").add_header(name, value).await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    let body: ErrorResponse = response.json();
    assert_eq!(body.error_code, "UNAUTHORIZED");
}

#[tokio::test]
async fn test_open_routes_skip_authentication() {
    let (_, service) = memory_service(test_credentials(), fast_password_service());
    let router = create_router(Arc::new(service));

    // refresh is reachable without an access token; the body decides the outcome
    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/refresh")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "access_token": "a", "refresh_token": "unknown" }).to_string(),
        ))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
