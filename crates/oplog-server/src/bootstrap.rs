//! Wiring of storage and the capture service from configuration.

use std::sync::Arc;

use oplog_capture::{CaptureError, LoggerRegistry, OperationLogService};
use oplog_db_memory::InMemoryLogStorage;
use oplog_db_postgres::PostgresLogStorage;
use oplog_storage::{DynLogStorage, StorageError};
use tracing::info;

use crate::config::{AppConfig, StorageBackend, StorageConfig};

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Storage initialization failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Capture initialization failed: {0}")]
    Capture(#[from] CaptureError),
}

/// Builds the registry first so it can be handed to the tracing layer
/// before any storage connection is attempted.
pub fn build_registry(cfg: &AppConfig) -> Result<Arc<LoggerRegistry>, BootstrapError> {
    cfg.capture.validate()?;
    Ok(Arc::new(LoggerRegistry::from_config(&cfg.capture)?))
}

/// Connects the configured storage backend, running migrations for PostgreSQL.
pub async fn build_storage(cfg: &StorageConfig) -> Result<DynLogStorage, BootstrapError> {
    let storage: DynLogStorage = match cfg.backend {
        StorageBackend::Postgres => Arc::new(
            PostgresLogStorage::connect(&cfg.postgres)
                .await
                .map_err(StorageError::from)?,
        ),
        StorageBackend::Memory => Arc::new(InMemoryLogStorage::new()),
    };
    info!(backend = storage.backend_name(), "Process log storage ready");
    Ok(storage)
}

pub async fn build_service(
    cfg: &AppConfig,
    registry: Arc<LoggerRegistry>,
) -> Result<OperationLogService, BootstrapError> {
    let storage = build_storage(&cfg.storage).await?;
    Ok(OperationLogService::with_registry(
        cfg.capture.clone(),
        registry,
        storage,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use oplog_capture::LogSink;

    #[tokio::test]
    async fn test_memory_backend_round_trip() {
        let mut cfg = AppConfig::default();
        cfg.storage.backend = StorageBackend::Memory;
        cfg.capture.layout = "%m%n".into();

        let registry = build_registry(&cfg).unwrap();
        let service = build_service(&cfg, Arc::clone(&registry)).await.unwrap();
        assert!(Arc::ptr_eq(service.registry(), &registry));

        registry
            .get_or_create("s1", "op-1", "a1", "OPERATION.log")
            .info("hello");
        service.persist("op-1", "a1").await.unwrap();
        assert_eq!(
            service.channel_log("s1", "op-1", "OPERATION.log").await.unwrap(),
            "hello\n"
        );
    }

    #[test]
    fn test_bad_layout_fails_registry() {
        let mut cfg = AppConfig::default();
        cfg.capture.layout = "%X{space".into();
        assert!(matches!(
            build_registry(&cfg),
            Err(BootstrapError::Capture(_))
        ));
    }
}
