//! Mapping from sqlx errors into the core taxonomy, plus transaction settlement.

use sqlx::{Postgres, Transaction};
use stockgate_core::{CoreError, Result};

/// `PostgreSQL` SQLSTATE for `serialization_failure`.
const SERIALIZATION_FAILURE: &str = "40001";
/// `PostgreSQL` SQLSTATE for `deadlock_detected`.
const DEADLOCK_DETECTED: &str = "40P01";

/// Convert a sqlx error, keeping the distinctions callers act on.
///
/// Unique violations and serialization failures get their own variants so the
/// allocator can retry them; everything else becomes [`CoreError::Database`]
/// prefixed with `context`.
pub(crate) fn classify(context: &str, err: &sqlx::Error) -> CoreError {
    if let Some(db) = err.as_database_error() {
        if db.is_unique_violation() {
            return CoreError::UniqueViolation {
                constraint: db.constraint().map(ToString::to_string),
            };
        }
        if matches!(
            db.code().as_deref(),
            Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED)
        ) {
            return CoreError::SerializationFailure(format!("{context}: {db}"));
        }
    }
    CoreError::Database(format!("{context}: {err}"))
}

/// Closure form of [`classify`] for `map_err`.
pub(crate) fn db_err(context: &'static str) -> impl Fn(sqlx::Error) -> CoreError {
    move |e| classify(context, &e)
}

/// Commit on success, roll back on failure.
///
/// Rollback errors are logged; the original failure is returned.
pub(crate) async fn settle<T>(tx: Transaction<'_, Postgres>, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await.map_err(db_err("Failed to commit transaction"))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}
