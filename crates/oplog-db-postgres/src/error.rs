//! Error types for the PostgreSQL storage backend.

use oplog_storage::StorageError;
use sqlx_core::error::Error as SqlxError;

/// PostgreSQL error code for unique violation (23505).
pub const PG_UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL error code for undefined table (42P01).
pub const PG_UNDEFINED_TABLE: &str = "42P01";

/// Checks if a sqlx error has a specific PostgreSQL error code.
pub fn has_pg_error_code(err: &SqlxError, code: &str) -> bool {
    if let SqlxError::Database(db_err) = err {
        db_err.code().as_deref() == Some(code)
    } else {
        false
    }
}

/// Errors specific to the PostgreSQL storage backend.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::error::Error),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A stored row could not be decoded.
    #[error("Row decode error: {message}")]
    Decode { message: String },
}

impl PostgresError {
    /// Creates a new decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}

impl From<PostgresError> for StorageError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Database(e) => sqlx_to_storage(&e),
            PostgresError::Migration(e) => StorageError::internal(format!("Migration error: {e}")),
            PostgresError::Decode { message } => StorageError::invalid_entry(message),
        }
    }
}

fn sqlx_to_storage(err: &SqlxError) -> StorageError {
    match err {
        SqlxError::Io(_)
        | SqlxError::Tls(_)
        | SqlxError::PoolTimedOut
        | SqlxError::PoolClosed
        | SqlxError::WorkerCrashed => StorageError::connection_error(err.to_string()),
        SqlxError::Database(_) if has_pg_error_code(err, PG_UNIQUE_VIOLATION) => {
            StorageError::query_error(format!("duplicate row: {err}"))
        }
        SqlxError::Database(_) if has_pg_error_code(err, PG_UNDEFINED_TABLE) => {
            StorageError::internal(format!("process_log table is missing: {err}"))
        }
        _ => StorageError::query_error(err.to_string()),
    }
}

/// Result type alias for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PostgresError>;
