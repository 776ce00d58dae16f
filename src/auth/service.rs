// Authentication service - business logic layer
//
// Session lifecycle: a session is created Active when a token pair is issued
// and becomes Expired (terminal) when its refresh token is rotated or the
// user logs out. A refresh token can therefore mint a new pair only once.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{
    error::AuthError,
    models::{RegisterRequest, Session, TokenPair, User},
    password::PasswordService,
    repository::{SessionRepository, UserRepository},
    token::CredentialProvider,
};
use crate::db::{Scope, StoreError, TxBackend, UnitOfWork};

const INVALID_CREDENTIALS: &str = "Invalid email or password";
const INVALID_REFRESH_TOKEN: &str = "Invalid refresh token";

/// Authentication service coordinating all auth operations
pub struct AuthService<B: TxBackend> {
    unit_of_work: UnitOfWork<B>,
    users: Arc<dyn UserRepository<B>>,
    sessions: Arc<dyn SessionRepository<B>>,
    credentials: Arc<CredentialProvider>,
    passwords: PasswordService,
}

impl<B: TxBackend> AuthService<B> {
    /// Create a new AuthService
    pub fn new(
        unit_of_work: UnitOfWork<B>,
        users: Arc<dyn UserRepository<B>>,
        sessions: Arc<dyn SessionRepository<B>>,
        credentials: Arc<CredentialProvider>,
        passwords: PasswordService,
    ) -> Self {
        Self {
            unit_of_work,
            users,
            sessions,
            credentials,
            passwords,
        }
    }

    /// Register a new user
    ///
    /// The password is hashed before the transaction opens; the insert runs
    /// in its own atomic scope. A taken email is `AlreadyExists`.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(&self, request: RegisterRequest) -> Result<User, AuthError> {
        request.validate()?;
        PasswordService::validate_password_strength(&request.password)?;

        let password_hash = self.hash_password(&request.password).await?;
        let user = User::new(
            &request.email.trim().to_lowercase(),
            password_hash,
            request.first_name,
            request.last_name,
            Utc::now(),
        );

        let created = self
            .unit_of_work
            .run_atomic(&Scope::root(), |scope| async move {
                self.users.create_user(&scope, &user).await.map_err(|err| match err {
                    StoreError::UniqueViolation(_) => {
                        AuthError::AlreadyExists("Email already exists".to_string())
                    }
                    other => AuthError::from(other),
                })
            })
            .await?;

        info!(user_id = %created.id, "User registered");
        Ok(created)
    }

    /// Login a user
    ///
    /// Unknown email, wrong password and unreadable stored hashes all fail
    /// with the same `InvalidArgument`.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let root = Scope::root();
        let (user_id, pair) = self
            .unit_of_work
            .run_atomic(&root, |scope| async move {
                let user = self.users.get_user_by_email(&scope, email).await.map_err(|err| {
                    warn!(error = %err, "Login rejected: user lookup failed");
                    AuthError::InvalidArgument(INVALID_CREDENTIALS.to_string())
                })?;

                self.verify_password(user.password_hash.clone(), password)
                    .await
                    .map_err(|err| {
                        warn!(user_id = %user.id, error = %err, "Login rejected: password verification failed");
                        AuthError::InvalidArgument(INVALID_CREDENTIALS.to_string())
                    })?;

                let pair = self.issue_session(&scope, user.id).await?;
                Ok::<_, AuthError>((user.id, pair))
            })
            .await?;

        info!(%user_id, "User logged in");
        Ok(pair)
    }

    /// Exchange a token pair for a new one
    ///
    /// The session row is locked for the whole operation, so of two
    /// concurrent refreshes of the same pair the second observes the session
    /// as Expired and fails.
    #[instrument(skip_all)]
    pub async fn refresh(&self, pair: &TokenPair) -> Result<TokenPair, AuthError> {
        let root = Scope::root();
        let (user_id, rotated) = self
            .unit_of_work
            .run_atomic(&root, |scope| async move {
                let session = self
                    .sessions
                    .lock_session_by_token(&scope, &pair.refresh_token)
                    .await
                    .map_err(|err| match err {
                        StoreError::NotFound => {
                            warn!("Refresh rejected: unknown refresh token");
                            AuthError::InvalidArgument(INVALID_REFRESH_TOKEN.to_string())
                        }
                        other => internal("Failed to load session", other),
                    })?;

                if !session.is_active() {
                    warn!(session_id = %session.id, user_id = %session.user_id, "Refresh rejected: session already expired");
                    return Err(AuthError::InvalidArgument(INVALID_REFRESH_TOKEN.to_string()));
                }

                let now = Utc::now();
                self.credentials
                    .verify_pair(session.user_id, pair, now)
                    .map_err(|err| {
                        warn!(session_id = %session.id, error = %err, "Refresh rejected: token pair verification failed");
                        AuthError::InvalidArgument(INVALID_REFRESH_TOKEN.to_string())
                    })?;

                self.sessions
                    .set_session_expired(&scope, session.id, now)
                    .await
                    .map_err(|err| internal("Failed to expire session", err))?;

                let rotated = self.issue_session(&scope, session.user_id).await?;
                Ok::<_, AuthError>((session.user_id, rotated))
            })
            .await?;

        info!(%user_id, "Token pair refreshed");
        Ok(rotated)
    }

    /// Revoke the session of a refresh token
    ///
    /// Revoking an already expired session succeeds and keeps its original
    /// expiry time.
    #[instrument(skip_all)]
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let root = Scope::root();
        self.unit_of_work
            .run_atomic(&root, |scope| async move {
                let session = self
                    .sessions
                    .lock_session_by_token(&scope, refresh_token)
                    .await
                    .map_err(|err| match err {
                        StoreError::NotFound => {
                            AuthError::InvalidArgument(INVALID_REFRESH_TOKEN.to_string())
                        }
                        other => internal("Failed to load session", other),
                    })?;

                if !session.is_active() {
                    info!(session_id = %session.id, "Logout of an already expired session");
                    return Ok(());
                }

                self.sessions
                    .set_session_expired(&scope, session.id, Utc::now())
                    .await
                    .map_err(|err| internal("Failed to expire session", err))?;

                info!(session_id = %session.id, user_id = %session.user_id, "User logged out");
                Ok(())
            })
            .await
    }

    /// Verify an access token and return its user id
    ///
    /// Never touches the store.
    pub fn parse_token(&self, token: &str) -> Result<Uuid, AuthError> {
        self.credentials.parse_token(token, Utc::now()).map_err(|err| {
            warn!(error = %err, "Rejected access token");
            AuthError::Unauthorized("Invalid or expired access token".to_string())
        })
    }

    /// Get current user information
    #[instrument(skip(self))]
    pub async fn current_user(&self, user_id: Uuid) -> Result<User, AuthError> {
        self.users
            .get_user_by_id(&Scope::root(), user_id)
            .await
            .map_err(|err| match err {
                StoreError::NotFound => AuthError::NotFound("User not found".to_string()),
                other => internal("Failed to load user", other),
            })
    }

    /// Generates a pair with a fresh pair id and stores its session
    async fn issue_session(&self, scope: &Scope<B>, user_id: Uuid) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        let pair = self
            .credentials
            .generate_pair(user_id, Uuid::new_v4(), now)
            .map_err(|err| internal("Failed to sign token pair", err))?;

        self.sessions
            .create_session(scope, &Session::new(user_id, pair.refresh_token.clone(), now))
            .await
            .map_err(|err| internal("Failed to create session", err))?;

        Ok(pair)
    }

    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let passwords = self.passwords.clone();
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || passwords.hash_password(&password))
            .await
            .map_err(|err| internal("Password hashing task failed", err))?
    }

    async fn verify_password(&self, hash: String, password: &str) -> Result<(), AuthError> {
        let passwords = self.passwords.clone();
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || passwords.verify_password(&hash, &password))
            .await
            .map_err(|err| internal("Password verification task failed", err))?
    }
}

fn internal(context: &str, err: impl std::fmt::Display) -> AuthError {
    error!(error = %err, "{}", context);
    AuthError::Internal(format!("{}: {}", context, err))
}
