// Router and service wiring

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::{
    handlers::{login_handler, logout_handler, me_handler, refresh_handler, register_handler},
    middleware::require_auth,
    password::PasswordService,
    repository::{MemorySessionRepository, MemoryUserRepository, PgSessionRepository, PgUserRepository},
    service::AuthService,
    token::CredentialProvider,
};
use crate::db::{DbPool, MemoryBackend, PgBackend, TxBackend, UnitOfWork};

/// Builds the HTTP router
///
/// Register, login and refresh are open; everything else goes through
/// [`require_auth`].
pub fn create_router<B: TxBackend>(service: Arc<AuthService<B>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = Router::new()
        .route("/api/auth/logout", post(logout_handler::<B>))
        .route("/api/users/me", get(me_handler::<B>))
        .route_layer(middleware::from_fn_with_state(service.clone(), require_auth::<B>));

    Router::new()
        .route("/api/auth/register", post(register_handler::<B>))
        .route("/api/auth/login", post(login_handler::<B>))
        .route("/api/auth/refresh", post(refresh_handler::<B>))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(service)
}

/// Auth service over PostgreSQL
pub fn postgres_service(
    pool: DbPool,
    credentials: Arc<CredentialProvider>,
    passwords: PasswordService,
) -> AuthService<PgBackend> {
    let backend = Arc::new(PgBackend::new(pool));
    AuthService::new(
        UnitOfWork::new(backend.clone()),
        Arc::new(PgUserRepository::new(backend.clone())),
        Arc::new(PgSessionRepository::new(backend)),
        credentials,
        passwords,
    )
}

/// Auth service over the in-memory store; the backend is returned for
/// inspection
pub fn memory_service(
    credentials: Arc<CredentialProvider>,
    passwords: PasswordService,
) -> (Arc<MemoryBackend>, AuthService<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    let service = AuthService::new(
        UnitOfWork::new(backend.clone()),
        Arc::new(MemoryUserRepository::new(backend.clone())),
        Arc::new(MemorySessionRepository::new(backend.clone())),
        credentials,
        passwords,
    );
    (backend, service)
}
