//! Entry point used by the workflow engine.

use std::sync::Arc;

use oplog_storage::{DynLogStorage, LogEntry, merge_content};
use tokio::task::JoinHandle;

use crate::config::CaptureConfig;
use crate::context::ExecutionContext;
use crate::error::{CaptureError, Result};
use crate::layer::ProcessLogLayer;
use crate::logger::ProcessLoggerHandle;
use crate::persister::{PersistReport, PersistTask, Persister};
use crate::reaper::Reaper;
use crate::registry::LoggerRegistry;

/// Bundles the registry, persister, reaper and storage behind the calls a
/// workflow engine makes.
#[derive(Debug, Clone)]
pub struct OperationLogService {
    config: Arc<CaptureConfig>,
    registry: Arc<LoggerRegistry>,
    persister: Persister,
    reaper: Arc<Reaper>,
}

impl OperationLogService {
    /// Builds the service on top of a storage backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: CaptureConfig, storage: DynLogStorage) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(LoggerRegistry::from_config(&config)?);
        Ok(Self::with_registry(config, registry, storage))
    }

    /// Builds the service around an existing registry, e.g. one already
    /// wired into a [`ProcessLogLayer`]. `config` is expected to be valid.
    pub fn with_registry(
        config: CaptureConfig,
        registry: Arc<LoggerRegistry>,
        storage: DynLogStorage,
    ) -> Self {
        let persister = Persister::new(Arc::clone(&registry), storage);
        let reaper = Arc::new(Reaper::new(persister.clone(), config.reaper.clone()));
        tracing::debug!(
            backend = persister.storage().backend_name(),
            parent_scope = %config.parent_scope,
            "Operation log service initialized"
        );
        Self {
            config: Arc::new(config),
            registry,
            persister,
            reaper,
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<LoggerRegistry> {
        &self.registry
    }

    pub fn persister(&self) -> &Persister {
        &self.persister
    }

    pub fn reaper(&self) -> &Arc<Reaper> {
        &self.reaper
    }

    /// Logger for the default channel of the step described by `ctx`.
    pub fn logger(&self, ctx: &ExecutionContext) -> ProcessLoggerHandle {
        self.acquire(ctx, &self.config.default_channel_name())
    }

    /// Logger for a named channel, e.g. `deploy` writes to `deploy.log`.
    pub fn logger_for_channel(&self, ctx: &ExecutionContext, log_name: &str) -> ProcessLoggerHandle {
        self.acquire(ctx, &self.config.channel_name(log_name))
    }

    fn acquire(&self, ctx: &ExecutionContext, channel: &str) -> ProcessLoggerHandle {
        self.registry.get_or_create_in(
            &ctx.space_id,
            ctx.namespace.as_deref(),
            ctx.operation_id(),
            ctx.activity_id(),
            channel,
        )
    }

    /// Flushes the loggers of an activity.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::Storage` if a row could not be written.
    pub async fn persist(&self, operation_id: &str, activity_id: &str) -> Result<PersistReport> {
        self.persister.persist(operation_id, activity_id).await
    }

    /// Flushes the loggers of the step described by `ctx`.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::Storage` if a row could not be written.
    pub async fn persist_context(&self, ctx: &ExecutionContext) -> Result<PersistReport> {
        self.persist(ctx.operation_id(), ctx.activity_id()).await
    }

    /// Flushes on a background task so the caller is not blocked.
    pub fn persist_in_background(
        &self,
        operation_id: impl Into<String>,
        activity_id: impl Into<String>,
    ) -> PersistTask {
        self.persister.persist_in_background(operation_id, activity_id)
    }

    /// Every stored row of an operation, ordered by write time.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::Retrieval` if storage cannot be read.
    pub async fn operation_logs(&self, space: &str, operation_id: &str) -> Result<Vec<LogEntry>> {
        self.persister
            .storage()
            .list_by_operation(space, operation_id)
            .await
            .map_err(|source| CaptureError::Retrieval {
                operation_id: operation_id.to_string(),
                source,
            })
    }

    /// Full text of one channel, concatenated across flushes.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::Retrieval` if storage cannot be read.
    pub async fn channel_log(&self, space: &str, operation_id: &str, channel: &str) -> Result<String> {
        let rows = self
            .persister
            .storage()
            .list_by_operation_and_channel(space, operation_id, channel)
            .await
            .map_err(|source| CaptureError::Retrieval {
                operation_id: operation_id.to_string(),
                source,
            })?;
        Ok(merge_content(&rows))
    }

    /// Starts the idle logger sweep, unless disabled.
    pub fn start_reaper(&self) -> Option<JoinHandle<()>> {
        Arc::clone(&self.reaper).start()
    }

    /// A tracing layer feeding this service's registry.
    pub fn layer(&self) -> ProcessLogLayer {
        ProcessLogLayer::new(Arc::clone(&self.registry), self.config.default_channel_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::LogSink;
    use oplog_db_memory::InMemoryLogStorage;

    fn service() -> (OperationLogService, InMemoryLogStorage) {
        let storage = InMemoryLogStorage::new();
        let config = CaptureConfig {
            layout: "%m%n".into(),
            ..CaptureConfig::default()
        };
        let service = OperationLogService::new(config, Arc::new(storage.clone())).unwrap();
        (service, storage)
    }

    #[tokio::test]
    async fn test_context_routing_and_channel_log() {
        let (service, _) = service();
        let ctx = ExecutionContext::new("s1", "op-1").with_current_activity_id("a1");

        service.logger(&ctx).info("main");
        service.logger_for_channel(&ctx, "deploy").info("deploy");

        let channels: Vec<_> = service
            .registry()
            .find_all("op-1", "a1")
            .iter()
            .map(|l| l.channel().to_string())
            .collect();
        assert_eq!(channels, vec!["OPERATION.log", "deploy.log"]);

        let report = service.persist_context(&ctx).await.unwrap();
        assert_eq!(report.rows_written, 2);
        assert_eq!(service.channel_log("s1", "op-1", "deploy.log").await.unwrap(), "deploy\n");
        assert_eq!(service.operation_logs("s1", "op-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_context_yields_null_logger() {
        let (service, _) = service();
        let ctx = ExecutionContext {
            space_id: "s1".into(),
            ..ExecutionContext::default()
        };
        let logger = service.logger(&ctx);
        logger.info("dropped");
        assert!(logger.is_null());
        assert!(service.registry().is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = CaptureConfig::default();
        config.reaper.interval_secs = 0;
        let result = OperationLogService::new(config, Arc::new(InMemoryLogStorage::new()));
        assert!(matches!(result, Err(CaptureError::InvalidConfig(_))));
    }
}
