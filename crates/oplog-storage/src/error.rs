//! Storage error types for the operation log storage layer.

use std::fmt;

/// Errors raised by an operation log storage backend.
///
/// Every write or read failure surfaces as one of these; backends never
/// swallow a failure.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to reach the storage backend.
    #[error("Connection error: {message}")]
    ConnectionError {
        /// Description of the connection error.
        message: String,
    },

    /// A statement was rejected or failed while executing.
    #[error("Query error: {message}")]
    QueryError {
        /// Description of the failed statement.
        message: String,
    },

    /// The entry cannot be stored or a stored row cannot be decoded.
    #[error("Invalid log entry: {message}")]
    InvalidEntry {
        /// Description of why the entry is invalid.
        message: String,
    },

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `ConnectionError` error.
    #[must_use]
    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
        }
    }

    /// Creates a new `QueryError` error.
    #[must_use]
    pub fn query_error(message: impl Into<String>) -> Self {
        Self::QueryError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidEntry` error.
    #[must_use]
    pub fn invalid_entry(message: impl Into<String>) -> Self {
        Self::InvalidEntry {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConnectionError { .. } => ErrorCategory::Infrastructure,
            Self::QueryError { .. } => ErrorCategory::Query,
            Self::InvalidEntry { .. } => ErrorCategory::Validation,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Infrastructure/connection error.
    Infrastructure,
    /// Statement execution error.
    Query,
    /// Validation error.
    Validation,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Query => write!(f, "query"),
            Self::Validation => write!(f, "validation"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
