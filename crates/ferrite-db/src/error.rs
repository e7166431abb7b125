//! Error types for the ferrite-db crate.

use ferrite_core::FerriteError;
use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to establish or acquire a database connection.
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[source] sqlx::Error),

    /// A database migration failed to apply.
    #[error("Migration failed: {0}")]
    MigrationFailed(#[source] sqlx::migrate::MigrateError),

    /// A database query failed to execute.
    #[error("Query failed: {0}")]
    QueryFailed(#[source] sqlx::Error),

    /// Beginning, committing or rolling back a transaction failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(#[source] sqlx::Error),

    /// Row expected by the caller does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl DbError {
    /// Check if this error indicates a connection problem.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, DbError::ConnectionFailed(_))
    }

    /// Check if this error is a unique constraint violation (SQLSTATE 23505).
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::QueryFailed(sqlx::Error::Database(db)) => db.code().as_deref() == Some("23505"),
            _ => false,
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DbError::ConnectionFailed(err)
            }
            other => DbError::QueryFailed(other),
        }
    }
}

/// Store failures are infrastructure errors, except unique violations
/// (a concurrent writer won a name race) and missing rows.
impl From<DbError> for FerriteError {
    fn from(err: DbError) -> Self {
        if err.is_unique_violation() {
            return FerriteError::conflict("a resource with the same identity already exists");
        }
        match err {
            DbError::NotFound(what) => FerriteError::NotFound {
                resource: what,
                id: None,
            },
            other => FerriteError::infrastructure(other.to_string()),
        }
    }
}
