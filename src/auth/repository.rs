// Database repositories for users and sessions
//
// Every call takes the execution scope it should run in, so the same
// repository works inside and outside a transaction.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::instrument;
use uuid::Uuid;

use crate::auth::models::{Session, User};
use crate::db::{MemoryBackend, PgBackend, Scope, StoreError, TxBackend};

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, created_at, updated_at";
const SESSION_COLUMNS: &str = "id, user_id, token, expired_at, created_at";

/// User persistence
#[async_trait]
pub trait UserRepository<B: TxBackend>: Send + Sync {
    /// Inserts a user; a taken email is `UniqueViolation`
    async fn create_user(&self, scope: &Scope<B>, user: &User) -> Result<User, StoreError>;

    /// Finds a user by email (case-insensitive)
    async fn get_user_by_email(&self, scope: &Scope<B>, email: &str) -> Result<User, StoreError>;

    async fn get_user_by_id(&self, scope: &Scope<B>, id: Uuid) -> Result<User, StoreError>;
}

/// Session persistence
#[async_trait]
pub trait SessionRepository<B: TxBackend>: Send + Sync {
    async fn create_session(&self, scope: &Scope<B>, session: &Session) -> Result<Session, StoreError>;

    async fn get_session_by_token(&self, scope: &Scope<B>, token: &str) -> Result<Session, StoreError>;

    /// Reads the session and locks its row until the scope's transaction ends
    async fn lock_session_by_token(&self, scope: &Scope<B>, token: &str) -> Result<Session, StoreError>;

    async fn set_session_expired(
        &self,
        scope: &Scope<B>,
        session_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

// ============================================================================
// PostgreSQL
// ============================================================================

/// User repository backed by PostgreSQL
#[derive(Clone)]
pub struct PgUserRepository {
    backend: Arc<PgBackend>,
}

impl PgUserRepository {
    /// Create a new PgUserRepository
    pub fn new(backend: Arc<PgBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl UserRepository<PgBackend> for PgUserRepository {
    #[instrument(skip(self, scope, user), fields(user_id = %user.id))]
    async fn create_user(&self, scope: &Scope<PgBackend>, user: &User) -> Result<User, StoreError> {
        let mut engine = scope.engine(&self.backend).await?;
        let created = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, email, password_hash, first_name, last_name, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(engine.conn()?)
        .await?;

        Ok(created)
    }

    #[instrument(skip(self, scope))]
    async fn get_user_by_email(&self, scope: &Scope<PgBackend>, email: &str) -> Result<User, StoreError> {
        let mut engine = scope.engine(&self.backend).await?;
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE LOWER(email) = LOWER($1)",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(engine.conn()?)
        .await?;

        user.ok_or(StoreError::NotFound)
    }

    #[instrument(skip(self, scope))]
    async fn get_user_by_id(&self, scope: &Scope<PgBackend>, id: Uuid) -> Result<User, StoreError> {
        let mut engine = scope.engine(&self.backend).await?;
        let user = sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(engine.conn()?)
            .await?;

        user.ok_or(StoreError::NotFound)
    }
}

/// Session repository backed by PostgreSQL
#[derive(Clone)]
pub struct PgSessionRepository {
    backend: Arc<PgBackend>,
}

impl PgSessionRepository {
    /// Create a new PgSessionRepository
    pub fn new(backend: Arc<PgBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl SessionRepository<PgBackend> for PgSessionRepository {
    #[instrument(skip(self, scope, session), fields(session_id = %session.id, user_id = %session.user_id))]
    async fn create_session(
        &self,
        scope: &Scope<PgBackend>,
        session: &Session,
    ) -> Result<Session, StoreError> {
        let mut engine = scope.engine(&self.backend).await?;
        let created = sqlx::query_as::<_, Session>(&format!(
            "INSERT INTO sessions (id, user_id, token, expired_at, created_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.token)
        .bind(session.expired_at)
        .bind(session.created_at)
        .fetch_one(engine.conn()?)
        .await?;

        Ok(created)
    }

    #[instrument(skip_all)]
    async fn get_session_by_token(
        &self,
        scope: &Scope<PgBackend>,
        token: &str,
    ) -> Result<Session, StoreError> {
        let mut engine = scope.engine(&self.backend).await?;
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {} FROM sessions WHERE token = $1",
            SESSION_COLUMNS
        ))
        .bind(token)
        .fetch_optional(engine.conn()?)
        .await?;

        session.ok_or(StoreError::NotFound)
    }

    #[instrument(skip_all)]
    async fn lock_session_by_token(
        &self,
        scope: &Scope<PgBackend>,
        token: &str,
    ) -> Result<Session, StoreError> {
        let mut engine = scope.engine(&self.backend).await?;
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {} FROM sessions WHERE token = $1 FOR UPDATE",
            SESSION_COLUMNS
        ))
        .bind(token)
        .fetch_optional(engine.conn()?)
        .await?;

        session.ok_or(StoreError::NotFound)
    }

    #[instrument(skip(self, scope))]
    async fn set_session_expired(
        &self,
        scope: &Scope<PgBackend>,
        session_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut engine = scope.engine(&self.backend).await?;
        let result = sqlx::query("UPDATE sessions SET expired_at = $2 WHERE id = $1")
            .bind(session_id)
            .bind(at)
            .execute(engine.conn()?)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// User repository over the in-memory store
#[derive(Clone)]
pub struct MemoryUserRepository {
    backend: Arc<MemoryBackend>,
}

impl MemoryUserRepository {
    pub fn new(backend: Arc<MemoryBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl UserRepository<MemoryBackend> for MemoryUserRepository {
    async fn create_user(&self, scope: &Scope<MemoryBackend>, user: &User) -> Result<User, StoreError> {
        let mut engine = scope.engine(&self.backend).await?;
        let tables = engine.tables()?;

        if tables.users.contains_key(&user.id) {
            return Err(StoreError::UniqueViolation("users_pkey".to_string()));
        }
        if tables
            .users
            .values()
            .any(|existing| existing.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::UniqueViolation("users_email_key".to_string()));
        }

        tables.users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn get_user_by_email(
        &self,
        scope: &Scope<MemoryBackend>,
        email: &str,
    ) -> Result<User, StoreError> {
        let mut engine = scope.engine(&self.backend).await?;
        engine
            .tables()?
            .users
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_user_by_id(&self, scope: &Scope<MemoryBackend>, id: Uuid) -> Result<User, StoreError> {
        let mut engine = scope.engine(&self.backend).await?;
        engine
            .tables()?
            .users
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

/// Session repository over the in-memory store
///
/// Transactions on the in-memory store are serialized as a whole, so the
/// locking read needs no extra work.
#[derive(Clone)]
pub struct MemorySessionRepository {
    backend: Arc<MemoryBackend>,
}

impl MemorySessionRepository {
    pub fn new(backend: Arc<MemoryBackend>) -> Self {
        Self { backend }
    }

    async fn find_by_token(
        &self,
        scope: &Scope<MemoryBackend>,
        token: &str,
    ) -> Result<Session, StoreError> {
        let mut engine = scope.engine(&self.backend).await?;
        engine
            .tables()?
            .sessions
            .values()
            .find(|session| session.token == token)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl SessionRepository<MemoryBackend> for MemorySessionRepository {
    async fn create_session(
        &self,
        scope: &Scope<MemoryBackend>,
        session: &Session,
    ) -> Result<Session, StoreError> {
        let mut engine = scope.engine(&self.backend).await?;
        let tables = engine.tables()?;

        if tables.sessions.contains_key(&session.id) {
            return Err(StoreError::UniqueViolation("sessions_pkey".to_string()));
        }
        if tables.sessions.values().any(|existing| existing.token == session.token) {
            return Err(StoreError::UniqueViolation("sessions_token_key".to_string()));
        }

        tables.sessions.insert(session.id, session.clone());
        Ok(session.clone())
    }

    async fn get_session_by_token(
        &self,
        scope: &Scope<MemoryBackend>,
        token: &str,
    ) -> Result<Session, StoreError> {
        self.find_by_token(scope, token).await
    }

    async fn lock_session_by_token(
        &self,
        scope: &Scope<MemoryBackend>,
        token: &str,
    ) -> Result<Session, StoreError> {
        self.find_by_token(scope, token).await
    }

    async fn set_session_expired(
        &self,
        scope: &Scope<MemoryBackend>,
        session_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut engine = scope.engine(&self.backend).await?;
        let session = engine
            .tables()?
            .sessions
            .get_mut(&session_id)
            .ok_or(StoreError::NotFound)?;
        session.expired_at = Some(at);
        Ok(())
    }
}
