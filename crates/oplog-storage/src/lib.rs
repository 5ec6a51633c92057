//! # oplog-storage
//!
//! Storage abstraction layer for operation logs.
//!
//! This crate defines the row model and the trait every storage backend
//! implements. It does not contain any implementations - those live in
//! `oplog-db-memory` and `oplog-db-postgres`.
//!
//! ## Overview
//!
//! [`OperationLogStorage`] is the contract between the log capture pipeline
//! and durable storage:
//! - `insert` writes one [`LogEntry`] per flushed channel
//! - `list_by_operation` returns all channels of an operation
//! - `list_by_operation_and_channel` returns a single channel
//!
//! Rows for the same operation and channel accumulate across flushes, so
//! readers use [`merge_content`] on the ordered result instead of assuming
//! one row per channel.

mod error;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use traits::OperationLogStorage;
pub use types::{LogEntry, merge_content, normalize_entries};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shared storage trait object.
pub type DynLogStorage = std::sync::Arc<dyn OperationLogStorage>;
