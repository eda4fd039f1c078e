//! Errors returned by the pool and repository functions.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// The addressed row does not exist.
    #[error("record not found")]
    NotFound,

    #[error("failed to apply migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl DbError {
    /// Whether a unique or primary key constraint rejected the write.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::Sqlx(sqlx::Error::Database(err)) if err.is_unique_violation())
    }
}
