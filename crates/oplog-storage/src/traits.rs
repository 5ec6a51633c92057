//! Storage traits for the operation log storage layer.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::types::LogEntry;

/// The persistence boundary for operation logs.
///
/// Implementations own their connection handling and must be thread-safe
/// (`Send + Sync`). Both read methods return rows ordered by `modified`
/// ascending with repeated ids removed; see [`crate::normalize_entries`].
///
/// # Example
///
/// ```ignore
/// use oplog_storage::{OperationLogStorage, StorageError, merge_content};
///
/// async fn deploy_log(storage: &dyn OperationLogStorage) -> Result<String, StorageError> {
///     let rows = storage
///         .list_by_operation_and_channel("space-1", "op-42", "OPERATION.log")
///         .await?;
///     Ok(merge_content(&rows))
/// }
/// ```
#[async_trait]
pub trait OperationLogStorage: Send + Sync {
    /// Writes one durable row.
    ///
    /// # Errors
    ///
    /// Returns a `StorageError` if the backend rejects or cannot perform the write.
    async fn insert(&self, entry: &LogEntry) -> Result<(), StorageError>;

    /// Lists every row of an operation, across all channels.
    ///
    /// # Errors
    ///
    /// Returns a `StorageError` for infrastructure issues.
    async fn list_by_operation(
        &self,
        space: &str,
        operation_id: &str,
    ) -> Result<Vec<LogEntry>, StorageError>;

    /// Lists the rows of one channel of an operation.
    ///
    /// # Errors
    ///
    /// Returns a `StorageError` for infrastructure issues.
    async fn list_by_operation_and_channel(
        &self,
        space: &str,
        operation_id: &str,
        channel: &str,
    ) -> Result<Vec<LogEntry>, StorageError>;

    /// Returns the name of this storage backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
