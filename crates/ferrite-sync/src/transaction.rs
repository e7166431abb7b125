//! Commit-or-rollback handling shared by the mutation entry points.

use ferrite_core::FerriteError;
use ferrite_db::StoreTx;
use tracing::{error, warn};

/// Commit `tx` if `result` is Ok, roll it back otherwise.
///
/// A failed commit is an infrastructure error: nothing from the
/// transaction is visible and the caller may retry.
pub(crate) async fn finish<T, R>(tx: T, result: Result<R, FerriteError>) -> Result<R, FerriteError>
where
    T: StoreTx,
{
    match result {
        Ok(value) => {
            if let Err(e) = tx.commit().await {
                error!(error = %e, "Commit failed, transaction rolled back");
                return Err(FerriteError::infrastructure(format!("commit failed: {e}")));
            }
            Ok(value)
        }
        Err(err) => {
            if let Err(e) = tx.rollback().await {
                warn!(error = %e, "Rollback failed");
            }
            Err(err)
        }
    }
}
