//! Process loggers: the per-(operation, activity, channel) log sinks.

use std::error::Error;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use time::OffsetDateTime;
use tokio::time::Instant;

use crate::event::{LogEvent, LogLevel};
use crate::filter::OriginFilter;
use crate::layout::{LogContext, PatternLayout};
use crate::registry::LoggerKey;

/// Level-tagged write calls shared by every logger variant.
///
/// Writes never fail: a call is either appended to an in-memory buffer or
/// dropped.
pub trait LogSink {
    /// Records one call. `origin` names where the call came from, `None`
    /// for direct calls.
    fn record(
        &self,
        level: LogLevel,
        message: &str,
        origin: Option<&str>,
        error: Option<&(dyn Error + 'static)>,
    );

    fn trace(&self, message: &str) {
        self.record(LogLevel::Trace, message, None, None);
    }

    fn debug(&self, message: &str) {
        self.record(LogLevel::Debug, message, None, None);
    }

    fn info(&self, message: &str) {
        self.record(LogLevel::Info, message, None, None);
    }

    fn warn(&self, message: &str) {
        self.record(LogLevel::Warn, message, None, None);
    }

    fn error(&self, message: &str) {
        self.record(LogLevel::Error, message, None, None);
    }

    fn trace_with(&self, message: &str, error: &(dyn Error + 'static)) {
        self.record(LogLevel::Trace, message, None, Some(error));
    }

    fn debug_with(&self, message: &str, error: &(dyn Error + 'static)) {
        self.record(LogLevel::Debug, message, None, Some(error));
    }

    fn info_with(&self, message: &str, error: &(dyn Error + 'static)) {
        self.record(LogLevel::Info, message, None, Some(error));
    }

    fn warn_with(&self, message: &str, error: &(dyn Error + 'static)) {
        self.record(LogLevel::Warn, message, None, Some(error));
    }

    fn error_with(&self, message: &str, error: &(dyn Error + 'static)) {
        self.record(LogLevel::Error, message, None, Some(error));
    }
}

#[derive(Debug)]
struct LogBuffer {
    text: String,
    lines: usize,
    last_write: Instant,
    modified: OffsetDateTime,
    drained: bool,
}

/// An in-memory log sink owned by the [`LoggerRegistry`](crate::LoggerRegistry).
///
/// Formatted calls accumulate in a buffer until a flush drains it. The
/// buffer has its own lock, so a flush may run while the owning step is
/// still writing; a write that lands after the drain is discarded.
#[derive(Debug)]
pub struct ProcessLogger {
    key: LoggerKey,
    namespace: Option<String>,
    name: String,
    sequence: u64,
    layout: Arc<PatternLayout>,
    filter: Arc<OriginFilter>,
    buffer: Mutex<LogBuffer>,
}

impl ProcessLogger {
    pub(crate) fn new(
        key: LoggerKey,
        namespace: Option<String>,
        name: String,
        sequence: u64,
        layout: Arc<PatternLayout>,
        filter: Arc<OriginFilter>,
    ) -> Self {
        Self {
            key,
            namespace,
            name,
            sequence,
            layout,
            filter,
            buffer: Mutex::new(LogBuffer {
                text: String::new(),
                lines: 0,
                last_write: Instant::now(),
                modified: OffsetDateTime::now_utc(),
                drained: false,
            }),
        }
    }

    pub fn key(&self) -> &LoggerKey {
        &self.key
    }

    pub fn space(&self) -> &str {
        &self.key.space
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn operation_id(&self) -> &str {
        &self.key.operation_id
    }

    pub fn activity_id(&self) -> &str {
        &self.key.activity_id
    }

    pub fn channel(&self) -> &str {
        &self.key.channel
    }

    /// Fully qualified logger name, rendered by `%c`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creation order within the registry.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Copy of the buffered text.
    pub fn contents(&self) -> String {
        self.lock().text.clone()
    }

    /// Number of calls buffered since creation or the last drain.
    pub fn line_count(&self) -> usize {
        self.lock().lines
    }

    pub fn is_empty(&self) -> bool {
        self.lock().text.is_empty()
    }

    /// Monotonic time of the last write, or of creation.
    pub fn last_write(&self) -> Instant {
        self.lock().last_write
    }

    /// Wall-clock time of the last write, or of creation.
    pub fn modified(&self) -> OffsetDateTime {
        self.lock().modified
    }

    /// Takes the buffered text and the number of calls it holds.
    ///
    /// Later writes are discarded; the logger is no longer reachable
    /// through the registry at this point.
    pub(crate) fn drain(&self) -> (String, usize) {
        let mut buffer = self.lock();
        buffer.drained = true;
        let lines = std::mem::take(&mut buffer.lines);
        (std::mem::take(&mut buffer.text), lines)
    }

    fn lock(&self) -> MutexGuard<'_, LogBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn context(&self) -> LogContext<'_> {
        LogContext {
            logger_name: &self.name,
            space: &self.key.space,
            namespace: self.namespace.as_deref(),
            operation_id: &self.key.operation_id,
            activity_id: &self.key.activity_id,
            channel: &self.key.channel,
        }
    }
}

impl LogSink for ProcessLogger {
    fn record(
        &self,
        level: LogLevel,
        message: &str,
        origin: Option<&str>,
        error: Option<&(dyn Error + 'static)>,
    ) {
        if !self.filter.accepts(origin) {
            return;
        }

        let thread = std::thread::current();
        let event = LogEvent::new(level, message)
            .with_origin(origin)
            .with_thread(thread.name())
            .with_error(error);
        let text = self.layout.format(&event, &self.context());

        let mut buffer = self.lock();
        if buffer.drained {
            drop(buffer);
            tracing::debug!(
                logger = %self.name,
                "Discarding log call on a drained process logger"
            );
            return;
        }
        buffer.text.push_str(&text);
        buffer.lines += 1;
        buffer.last_write = Instant::now();
        buffer.modified = event.timestamp;
    }
}

/// No-op sink handed out when the operation or activity id is missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProcessLogger;

impl LogSink for NullProcessLogger {
    fn record(
        &self,
        level: LogLevel,
        _message: &str,
        origin: Option<&str>,
        _error: Option<&(dyn Error + 'static)>,
    ) {
        tracing::trace!(%level, origin, "Dropping log call without operation context");
    }
}

/// What [`LoggerRegistry::get_or_create`](crate::LoggerRegistry::get_or_create) returns.
#[derive(Debug, Clone)]
pub enum ProcessLoggerHandle {
    Active(Arc<ProcessLogger>),
    Null(NullProcessLogger),
}

impl ProcessLoggerHandle {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(_))
    }

    pub fn as_active(&self) -> Option<&Arc<ProcessLogger>> {
        match self {
            Self::Active(logger) => Some(logger),
            Self::Null(_) => None,
        }
    }

    pub fn into_active(self) -> Option<Arc<ProcessLogger>> {
        match self {
            Self::Active(logger) => Some(logger),
            Self::Null(_) => None,
        }
    }
}

impl LogSink for ProcessLoggerHandle {
    fn record(
        &self,
        level: LogLevel,
        message: &str,
        origin: Option<&str>,
        error: Option<&(dyn Error + 'static)>,
    ) {
        match self {
            Self::Active(logger) => logger.record(level, message, origin, error),
            Self::Null(logger) => logger.record(level, message, origin, error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    fn logger(filter: OriginFilter) -> ProcessLogger {
        let key = LoggerKey::new("s1", "op-42", "a1", "OPERATION.log");
        let name = key.logger_name("multiapps.process");
        ProcessLogger::new(
            key,
            None,
            name,
            0,
            Arc::new(PatternLayout::parse("%p %c %m%n").unwrap()),
            Arc::new(filter),
        )
    }

    #[derive(Debug)]
    struct UploadError;

    impl fmt::Display for UploadError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "quota exceeded")
        }
    }

    impl Error for UploadError {}

    #[test]
    fn test_writes_append_in_order() {
        let logger = logger(OriginFilter::default());
        logger.info("step 1 started");
        logger.debug("validating input");
        logger.error_with("step 1 failed", &UploadError);

        assert_eq!(logger.line_count(), 3);
        assert_eq!(
            logger.contents(),
            "INFO multiapps.process.op-42.OPERATION.log.a1 step 1 started\n\
             DEBUG multiapps.process.op-42.OPERATION.log.a1 validating input\n\
             ERROR multiapps.process.op-42.OPERATION.log.a1 step 1 failed\n\
             quota exceeded\n"
        );
    }

    #[test]
    fn test_every_level_accepts_an_error() {
        let logger = logger(OriginFilter::accept_all());
        logger.trace_with("retrying", &UploadError);
        logger.debug_with("fallback", &UploadError);
        logger.info_with("skipped", &UploadError);
        logger.warn_with("degraded", &UploadError);

        assert_eq!(logger.line_count(), 4);
        let contents = logger.contents();
        let levels: Vec<&str> = contents
            .lines()
            .filter(|line| *line != "quota exceeded")
            .map(|line| line.split(' ').next().unwrap_or_default())
            .collect();
        assert_eq!(levels, ["TRACE", "DEBUG", "INFO", "WARN"]);
        assert_eq!(contents.matches("quota exceeded\n").count(), 4);
    }

    #[test]
    fn test_filtered_origin_is_not_buffered() {
        let logger = logger(OriginFilter::default());
        logger.record(LogLevel::Info, "pool acquired", Some("sqlx::pool"), None);
        assert!(logger.is_empty());
        assert_eq!(logger.line_count(), 0);
    }

    #[test]
    fn test_drain_empties_and_closes() {
        let logger = logger(OriginFilter::accept_all());
        logger.warn("disk almost full");

        let (text, lines) = logger.drain();
        assert_eq!(lines, 1);
        assert!(text.contains("disk almost full"));
        assert!(logger.is_empty());

        logger.info("late write");
        assert!(logger.is_empty());
        assert_eq!(logger.drain(), (String::new(), 0));
    }

    #[test]
    fn test_write_moves_last_write_forward() {
        let logger = logger(OriginFilter::accept_all());
        let created = logger.last_write();
        logger.trace("tick");
        assert!(logger.last_write() >= created);
    }

    #[test]
    fn test_null_handle() {
        let handle = ProcessLoggerHandle::Null(NullProcessLogger);
        handle.info("ignored");
        handle.error_with("ignored", &UploadError);
        assert!(handle.is_null());
        assert!(handle.as_active().is_none());
    }
}
