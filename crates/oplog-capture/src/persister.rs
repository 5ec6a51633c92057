//! Draining process loggers into durable rows.

use std::sync::Arc;

use indexmap::IndexMap;
use oplog_storage::{DynLogStorage, LogEntry, StorageError};
use tokio::task::JoinHandle;

use crate::error::{CaptureError, Result};
use crate::logger::ProcessLogger;
use crate::registry::LoggerRegistry;

/// Outcome of one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistReport {
    /// Loggers claimed from the registry and drained.
    pub loggers: usize,
    /// Rows written, one per non-empty channel.
    pub rows_written: usize,
    /// Channels whose row was written, in write order.
    pub channels: Vec<String>,
    /// Channel groups skipped because nothing was buffered.
    pub skipped_empty: usize,
}

impl PersistReport {
    pub fn is_noop(&self) -> bool {
        self.loggers == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GroupKey {
    space: String,
    operation_id: String,
    channel: String,
}

#[derive(Debug, Default)]
struct ChannelBatch {
    namespace: Option<String>,
    content: String,
}

/// Flushes the loggers of an operation activity to storage.
///
/// Each logger is claimed by removing it from the registry before its
/// buffer is read, so two concurrent flushes of the same activity never
/// write the same text twice. Claimed loggers stay evicted when a write
/// fails; their text is lost and the failure is returned.
#[derive(Clone)]
pub struct Persister {
    registry: Arc<LoggerRegistry>,
    storage: DynLogStorage,
}

impl std::fmt::Debug for Persister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persister")
            .field("registry", &self.registry)
            .field("storage", &self.storage.backend_name())
            .finish()
    }
}

impl Persister {
    pub fn new(registry: Arc<LoggerRegistry>, storage: DynLogStorage) -> Self {
        Self { registry, storage }
    }

    pub fn registry(&self) -> &Arc<LoggerRegistry> {
        &self.registry
    }

    pub fn storage(&self) -> &DynLogStorage {
        &self.storage
    }

    /// Drains every logger registered for the activity and writes one row
    /// per channel.
    ///
    /// Returns an empty report if no logger is registered.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::Storage` if any row could not be written.
    /// Rows of other channels are still attempted and all drained loggers
    /// are evicted either way.
    pub async fn persist(&self, operation_id: &str, activity_id: &str) -> Result<PersistReport> {
        let candidates = self.registry.find_all(operation_id, activity_id);
        if candidates.is_empty() {
            tracing::debug!(operation_id, activity_id, "No process loggers to persist");
            return Ok(PersistReport::default());
        }
        let claimed = self.claim(candidates);
        self.write_claimed(&claimed).await
    }

    /// Runs [`persist`](Self::persist) on a background task.
    pub fn persist_in_background(
        &self,
        operation_id: impl Into<String>,
        activity_id: impl Into<String>,
    ) -> PersistTask {
        let persister = self.clone();
        let operation_id = operation_id.into();
        let activity_id = activity_id.into();
        let handle = tokio::spawn(async move {
            let result = persister.persist(&operation_id, &activity_id).await;
            if let Err(e) = &result {
                tracing::error!(
                    operation_id = %operation_id,
                    activity_id = %activity_id,
                    error = %e,
                    "Background persist of process logs failed"
                );
            }
            result
        });
        PersistTask { handle }
    }

    /// Removes each candidate from the registry, keeping those this call removed.
    pub(crate) fn claim(&self, candidates: Vec<Arc<ProcessLogger>>) -> Vec<Arc<ProcessLogger>> {
        candidates
            .into_iter()
            .filter(|logger| self.registry.remove(logger))
            .collect()
    }

    /// Drains already claimed loggers and writes their text grouped by channel.
    pub(crate) async fn write_claimed(&self, claimed: &[Arc<ProcessLogger>]) -> Result<PersistReport> {
        let mut report = PersistReport {
            loggers: claimed.len(),
            ..PersistReport::default()
        };
        if claimed.is_empty() {
            return Ok(report);
        }

        let mut groups: IndexMap<GroupKey, ChannelBatch> = IndexMap::new();
        for logger in claimed {
            let (text, _) = logger.drain();
            let batch = groups
                .entry(GroupKey {
                    space: logger.space().to_string(),
                    operation_id: logger.operation_id().to_string(),
                    channel: logger.channel().to_string(),
                })
                .or_default();
            if batch.namespace.is_none() {
                batch.namespace = logger.namespace().map(str::to_owned);
            }
            batch.content.push_str(&text);
        }

        let mut first_failure: Option<(GroupKey, StorageError)> = None;
        let mut failed_channels = 0;

        for (key, batch) in groups {
            if batch.content.is_empty() {
                report.skipped_empty += 1;
                continue;
            }
            let entry = LogEntry::new(&key.space, &key.operation_id, &key.channel, batch.content)
                .with_namespace(batch.namespace);

            match self.storage.insert(&entry).await {
                Ok(()) => {
                    report.rows_written += 1;
                    report.channels.push(key.channel);
                }
                Err(e) => {
                    tracing::error!(
                        operation_id = %key.operation_id,
                        channel = %key.channel,
                        backend = self.storage.backend_name(),
                        error = %e,
                        "Failed to persist process log"
                    );
                    failed_channels += 1;
                    if first_failure.is_none() {
                        first_failure = Some((key, e));
                    }
                }
            }
        }

        if let Some((key, source)) = first_failure {
            return Err(CaptureError::Storage {
                operation_id: key.operation_id,
                channel: key.channel,
                failed_channels,
                source,
            });
        }

        tracing::debug!(
            loggers = report.loggers,
            rows = report.rows_written,
            skipped = report.skipped_empty,
            "Persisted process logs"
        );
        Ok(report)
    }
}

/// A persist running in the background.
///
/// Dropping the task detaches it; the flush still completes.
#[derive(Debug)]
pub struct PersistTask {
    handle: JoinHandle<Result<PersistReport>>,
}

impl PersistTask {
    /// Waits for the flush to finish.
    ///
    /// # Errors
    ///
    /// Returns the flush error, or `CaptureError::Task` if the task panicked
    /// or was aborted.
    pub async fn wait(self) -> Result<PersistReport> {
        self.handle.await?
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn into_handle(self) -> JoinHandle<Result<PersistReport>> {
        self.handle
    }
}
