//! Error types for log capture and persistence.

use oplog_storage::StorageError;

/// Errors surfaced by the capture pipeline.
///
/// Writing to a process logger never fails; only flushing to and reading
/// from storage, configuration, and background task supervision can.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// One or more channel rows could not be written during a flush.
    ///
    /// The drained loggers are already evicted when this is returned; the
    /// buffered text of the failed channels is discarded.
    #[error(
        "Failed to persist {failed_channels} channel(s) of operation {operation_id} (first failure on {channel})"
    )]
    Storage {
        operation_id: String,
        channel: String,
        failed_channels: usize,
        #[source]
        source: StorageError,
    },

    /// Stored logs of an operation could not be read.
    #[error("Failed to read logs of operation {operation_id}")]
    Retrieval {
        operation_id: String,
        #[source]
        source: StorageError,
    },

    /// The layout template could not be parsed.
    #[error("Invalid log layout {pattern:?}: {reason}")]
    InvalidLayout { pattern: String, reason: String },

    /// A configuration value is out of range.
    #[error("Invalid capture configuration: {0}")]
    InvalidConfig(String),

    /// A background persist task panicked or was cancelled.
    #[error("Background persist task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl CaptureError {
    pub fn invalid_layout(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidLayout {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Returns `true` if the failure came from the storage backend.
    #[must_use]
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage { .. } | Self::Retrieval { .. })
    }

    /// The underlying storage error, if any.
    #[must_use]
    pub fn storage_error(&self) -> Option<&StorageError> {
        match self {
            Self::Storage { source, .. } | Self::Retrieval { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type for capture operations.
pub type Result<T> = std::result::Result<T, CaptureError>;
