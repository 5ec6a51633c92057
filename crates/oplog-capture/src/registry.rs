//! Concurrent registry of live process loggers.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::config::CaptureConfig;
use crate::error::Result;
use crate::filter::OriginFilter;
use crate::layout::PatternLayout;
use crate::logger::{NullProcessLogger, ProcessLogger, ProcessLoggerHandle};

/// Logger-name prefix used when none is configured.
pub const DEFAULT_PARENT_SCOPE: &str = "multiapps.process";

/// Identity of a process logger.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoggerKey {
    pub space: String,
    pub operation_id: String,
    pub activity_id: String,
    pub channel: String,
}

impl LoggerKey {
    pub fn new(
        space: impl Into<String>,
        operation_id: impl Into<String>,
        activity_id: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            space: space.into(),
            operation_id: operation_id.into(),
            activity_id: activity_id.into(),
            channel: channel.into(),
        }
    }

    /// `<parent>.<operation>.<channel>.<activity>`. Stored rows are grouped
    /// by this name in log viewers, so the segment order must not change.
    pub fn logger_name(&self, parent_scope: &str) -> String {
        format!(
            "{parent_scope}.{}.{}.{}",
            self.operation_id, self.channel, self.activity_id
        )
    }
}

impl fmt::Display for LoggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.space, self.operation_id, self.channel, self.activity_id
        )
    }
}

/// Owns every live [`ProcessLogger`].
///
/// Creation is atomic per key: concurrent callers asking for the same key
/// all receive the same instance. Only the registry evicts loggers; callers
/// keep an `Arc` for the duration of their step.
pub struct LoggerRegistry {
    loggers: DashMap<LoggerKey, Arc<ProcessLogger>>,
    sequence: AtomicU64,
    layout: Arc<PatternLayout>,
    filter: Arc<OriginFilter>,
    parent_scope: String,
}

impl fmt::Debug for LoggerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerRegistry")
            .field("loggers", &self.loggers.len())
            .field("layout", &self.layout.pattern())
            .field("filter", &self.filter)
            .field("parent_scope", &self.parent_scope)
            .finish()
    }
}

impl Default for LoggerRegistry {
    fn default() -> Self {
        Self::new(PatternLayout::default(), OriginFilter::default())
    }
}

impl LoggerRegistry {
    pub fn new(layout: PatternLayout, filter: OriginFilter) -> Self {
        Self {
            loggers: DashMap::new(),
            sequence: AtomicU64::new(0),
            layout: Arc::new(layout),
            filter: Arc::new(filter),
            parent_scope: DEFAULT_PARENT_SCOPE.to_string(),
        }
    }

    /// Builds a registry from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured layout cannot be parsed.
    pub fn from_config(config: &CaptureConfig) -> Result<Self> {
        let layout = PatternLayout::parse(&config.layout)?;
        let filter = OriginFilter::with_ignored(config.filter.ignored_origins.iter().cloned());
        Ok(Self::new(layout, filter).with_parent_scope(config.parent_scope.clone()))
    }

    #[must_use]
    pub fn with_parent_scope(mut self, parent_scope: impl Into<String>) -> Self {
        self.parent_scope = parent_scope.into();
        self
    }

    pub fn parent_scope(&self) -> &str {
        &self.parent_scope
    }

    pub fn layout(&self) -> &PatternLayout {
        &self.layout
    }

    pub fn filter(&self) -> &OriginFilter {
        &self.filter
    }

    /// Returns the logger for the key, creating it on first use.
    ///
    /// An empty `operation_id` or `activity_id` yields a
    /// [`NullProcessLogger`] and registers nothing.
    pub fn get_or_create(
        &self,
        space: &str,
        operation_id: &str,
        activity_id: &str,
        channel: &str,
    ) -> ProcessLoggerHandle {
        self.get_or_create_in(space, None, operation_id, activity_id, channel)
    }

    /// Like [`get_or_create`](Self::get_or_create), recording a namespace on
    /// the created logger. An existing logger keeps its namespace.
    pub fn get_or_create_in(
        &self,
        space: &str,
        namespace: Option<&str>,
        operation_id: &str,
        activity_id: &str,
        channel: &str,
    ) -> ProcessLoggerHandle {
        if operation_id.is_empty() || activity_id.is_empty() {
            tracing::info!(
                space,
                operation_id,
                activity_id,
                channel,
                "Correlation id or activity id is empty, process logs will be discarded"
            );
            return ProcessLoggerHandle::Null(NullProcessLogger);
        }

        let key = LoggerKey::new(space, operation_id, activity_id, channel);
        if let Some(existing) = self.loggers.get(&key) {
            return ProcessLoggerHandle::Active(Arc::clone(existing.value()));
        }

        let mut created = false;
        let logger = self
            .loggers
            .entry(key.clone())
            .or_insert_with(|| {
                created = true;
                let name = key.logger_name(&self.parent_scope);
                let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
                Arc::new(ProcessLogger::new(
                    key,
                    namespace.map(str::to_owned),
                    name,
                    sequence,
                    Arc::clone(&self.layout),
                    Arc::clone(&self.filter),
                ))
            })
            .clone();

        if created {
            tracing::debug!(logger = %logger.name(), space, "Created process logger");
        }
        ProcessLoggerHandle::Active(logger)
    }

    /// Loggers of one operation activity across all channels, in creation order.
    ///
    /// This is a snapshot: loggers created while it is taken may be missing.
    pub fn find_all(&self, operation_id: &str, activity_id: &str) -> Vec<Arc<ProcessLogger>> {
        self.collect(|key| key.operation_id == operation_id && key.activity_id == activity_id)
    }

    /// Loggers of every activity of an operation, in creation order.
    pub fn find_by_operation(&self, operation_id: &str) -> Vec<Arc<ProcessLogger>> {
        self.collect(|key| key.operation_id == operation_id)
    }

    /// Every live logger, in creation order.
    pub fn snapshot(&self) -> Vec<Arc<ProcessLogger>> {
        self.collect(|_| true)
    }

    /// Evicts `logger` if it is still the registered instance for its key.
    ///
    /// Returns `true` only for the call that actually removed it, so the
    /// result can be used to claim a logger exactly once. Removing an
    /// already evicted logger is a no-op and never touches a newer logger
    /// registered under the same key.
    pub fn remove(&self, logger: &ProcessLogger) -> bool {
        self.loggers
            .remove_if(logger.key(), |_, registered| {
                std::ptr::eq(Arc::as_ptr(registered), logger)
            })
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.loggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loggers.is_empty()
    }

    fn collect(&self, matches: impl Fn(&LoggerKey) -> bool) -> Vec<Arc<ProcessLogger>> {
        let mut found: Vec<_> = self
            .loggers
            .iter()
            .filter(|entry| matches(entry.key()))
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        found.sort_by_key(|logger| logger.sequence());
        found
    }
}
