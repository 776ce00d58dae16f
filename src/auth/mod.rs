// Authentication module
// Token-pair sessions: registration, login, refresh-token rotation and logout

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod password;
pub mod repository;
pub mod service;
pub mod token;

// Re-export commonly used types
pub use error::AuthError;
pub use handlers::{login_handler, logout_handler, me_handler, refresh_handler, register_handler};
pub use middleware::{require_auth, AuthenticatedUser};
pub use models::{LoginRequest, LogoutRequest, RefreshRequest, RegisterRequest, Session, TokenPair, User, UserResponse};
pub use password::PasswordService;
pub use repository::{
    MemorySessionRepository, MemoryUserRepository, PgSessionRepository, PgUserRepository, SessionRepository,
    UserRepository,
};
pub use service::AuthService;
pub use token::{Claims, CredentialProvider, Credentials, TokenError};
