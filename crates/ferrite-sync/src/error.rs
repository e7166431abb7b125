//! Engine-local errors and their mapping into the shared taxonomy.

use ferrite_core::FerriteError;
use ferrite_db::DbError;
use thiserror::Error;

/// Concurrency guard failures.
#[derive(Debug, Error)]
pub enum GuardError {
    /// Another transaction kept the lock through every retry.
    #[error("lock for {entity} still held after {attempts} attempts")]
    Contended { entity: String, attempts: u32 },

    /// The store failed while trying the lock.
    #[error(transparent)]
    Store(#[from] DbError),
}

/// Lock failures are retryable infrastructure errors, never business errors.
impl From<GuardError> for FerriteError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::Contended { .. } => FerriteError::infrastructure(err.to_string()),
            GuardError::Store(db) => FerriteError::infrastructure(db.to_string()),
        }
    }
}
