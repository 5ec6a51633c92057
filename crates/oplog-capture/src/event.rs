//! Log call representation passed from a logger to the layout.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use time::OffsetDateTime;

/// Severity of a process log call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&tracing::Level> for LogLevel {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => LogLevel::Trace,
            tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::INFO => LogLevel::Info,
            tracing::Level::WARN => LogLevel::Warn,
            tracing::Level::ERROR => LogLevel::Error,
        }
    }
}

/// A single log call, before formatting.
#[derive(Debug, Clone, Copy)]
pub struct LogEvent<'a> {
    pub timestamp: OffsetDateTime,
    pub level: LogLevel,
    pub message: &'a str,
    /// Where the call came from, e.g. a tracing target such as `sqlx::query`.
    /// Calls made directly on a logger carry no origin.
    pub origin: Option<&'a str>,
    pub thread: Option<&'a str>,
    pub error: Option<&'a (dyn Error + 'static)>,
}

impl<'a> LogEvent<'a> {
    /// Creates an event stamped with the current time.
    pub fn new(level: LogLevel, message: &'a str) -> Self {
        Self {
            timestamp: OffsetDateTime::now_utc(),
            level,
            message,
            origin: None,
            thread: None,
            error: None,
        }
    }

    pub fn with_origin(mut self, origin: Option<&'a str>) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_thread(mut self, thread: Option<&'a str>) -> Self {
        self.thread = thread;
        self
    }

    pub fn with_error(mut self, error: Option<&'a (dyn Error + 'static)>) -> Self {
        self.error = error;
        self
    }

    pub fn with_timestamp(mut self, timestamp: OffsetDateTime) -> Self {
        self.timestamp = timestamp;
        self
    }
}
