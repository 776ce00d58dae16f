// Persistence error type shared by the backends and the repositories

use thiserror::Error;

/// Errors raised by the store, independent of the backend in use
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying driver error
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// The requested row does not exist
    #[error("Record not found")]
    NotFound,

    /// A unique constraint rejected the write
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// The transaction bound to the scope was already committed or rolled back
    #[error("Transaction is no longer open")]
    TransactionClosed,

    /// Backend failure not tied to a driver error
    #[error("Store backend error: {0}")]
    Backend(String),

    /// Migration failed at startup
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                let constraint = db_err
                    .constraint()
                    .map(str::to_owned)
                    .unwrap_or_else(|| db_err.message().to_owned());
                StoreError::UniqueViolation(constraint)
            }
            other => StoreError::Database(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::NotFound));
    }

    #[test]
    fn other_driver_errors_are_wrapped() {
        let err = StoreError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Database(sqlx::Error::PoolTimedOut)));
    }
}
