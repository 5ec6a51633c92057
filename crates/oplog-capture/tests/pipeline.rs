use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use oplog_capture::{
    CaptureConfig, CaptureError, ExecutionContext, LogSink, OperationLogService, ReapPolicy,
};
use oplog_db_memory::InMemoryLogStorage;
use oplog_storage::{LogEntry, OperationLogStorage, StorageError};
use tokio::time::Instant;

fn service_with(storage: Arc<dyn OperationLogStorage>, policy: ReapPolicy) -> OperationLogService {
    let mut config = CaptureConfig::default();
    config.reaper.policy = policy;
    config.reaper.idle_threshold_secs = 30;
    OperationLogService::new(config, storage).expect("valid config")
}

struct UnavailableStorage;

#[async_trait]
impl OperationLogStorage for UnavailableStorage {
    async fn insert(&self, _entry: &LogEntry) -> Result<(), StorageError> {
        Err(StorageError::connection_error("database is down"))
    }

    async fn list_by_operation(
        &self,
        _space: &str,
        _operation_id: &str,
    ) -> Result<Vec<LogEntry>, StorageError> {
        Err(StorageError::connection_error("database is down"))
    }

    async fn list_by_operation_and_channel(
        &self,
        _space: &str,
        _operation_id: &str,
        _channel: &str,
    ) -> Result<Vec<LogEntry>, StorageError> {
        Err(StorageError::connection_error("database is down"))
    }

    fn backend_name(&self) -> &'static str {
        "unavailable"
    }
}

#[tokio::test]
async fn step_logs_are_persisted_once_per_channel() {
    let storage = InMemoryLogStorage::new();
    let service = service_with(Arc::new(storage.clone()), ReapPolicy::Drop);
    let registry = service.registry();

    let logger = registry.get_or_create("s1", "op-42", "a1", "OPERATION.log");
    logger.info("step 1 started");
    logger.debug("validating input");
    logger.error("step 1 failed");

    let report = service.persist("op-42", "a1").await.expect("persist");
    assert_eq!(report.rows_written, 1);
    assert!(registry.find_all("op-42", "a1").is_empty());

    let rows = service.operation_logs("s1", "op-42").await.expect("read");
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.operation_id, "op-42");
    assert_eq!(row.channel, "OPERATION.log");
    assert_eq!(row.space, "s1");

    let started = row.content.find("step 1 started").expect("first line");
    let validating = row.content.find("validating input").expect("second line");
    let failed = row.content.find("step 1 failed").expect("third line");
    assert!(started < validating && validating < failed);
    assert!(row.content.contains("#INFO#multiapps.process.op-42.OPERATION.log.a1#"));
    assert!(row.content.contains("#DEBUG#"));
    assert!(row.content.contains("#ERROR#"));

    // Nothing left to drain.
    let second = service.persist("op-42", "a1").await.expect("second persist");
    assert!(second.is_noop());
    assert_eq!(storage.len().await, 1);
}

#[tokio::test]
async fn later_flushes_append_to_the_channel() {
    let storage = InMemoryLogStorage::new();
    let service = service_with(Arc::new(storage.clone()), ReapPolicy::Drop);
    let ctx = ExecutionContext::new("s1", "op-7").with_task_id("deploy-app");

    service.logger(&ctx).info("first flush");
    service.persist_context(&ctx).await.expect("persist");
    tokio::time::sleep(Duration::from_millis(5)).await;
    service.logger(&ctx).info("second flush");
    service.persist_context(&ctx).await.expect("persist");

    assert_eq!(storage.len().await, 2);
    let text = service
        .channel_log("s1", "op-7", "OPERATION.log")
        .await
        .expect("read");
    let first = text.find("first flush").expect("first");
    let second = text.find("second flush").expect("second");
    assert!(first < second);
}

#[tokio::test]
async fn storage_failure_is_reported_and_loggers_are_evicted() {
    let service = service_with(Arc::new(UnavailableStorage), ReapPolicy::Drop);
    let ctx = ExecutionContext::new("s1", "op-9").with_current_activity_id("a1");
    service.logger(&ctx).warn("about to fail");

    let err = service.persist_context(&ctx).await.unwrap_err();
    assert!(err.is_storage());
    assert!(matches!(
        err.storage_error(),
        Some(StorageError::ConnectionError { .. })
    ));
    assert!(service.registry().is_empty());

    let read = service.operation_logs("s1", "op-9").await.unwrap_err();
    assert!(matches!(read, CaptureError::Retrieval { .. }));
}

#[tokio::test]
async fn background_persist_reports_storage_failure() {
    let service = service_with(Arc::new(UnavailableStorage), ReapPolicy::Drop);
    service
        .registry()
        .get_or_create("s1", "op-9", "a1", "OPERATION.log")
        .info("lost");

    let err = service
        .persist_in_background("op-9", "a1")
        .wait()
        .await
        .unwrap_err();
    assert!(matches!(err, CaptureError::Storage { .. }));
}

#[tokio::test]
async fn abandoned_logger_is_reaped_without_a_row() {
    let storage = InMemoryLogStorage::new();
    let service = service_with(Arc::new(storage.clone()), ReapPolicy::Drop);
    service
        .registry()
        .get_or_create("s1", "op-5", "a1", "OPERATION.log")
        .info("never flushed");

    let report = service
        .reaper()
        .sweep_at(Instant::now() + Duration::from_secs(31))
        .await;
    assert_eq!(report.reaped, 1);
    assert!(service.registry().find_all("op-5", "a1").is_empty());
    assert!(storage.is_empty().await);
}

#[tokio::test]
async fn persist_policy_salvages_abandoned_logger() {
    let storage = InMemoryLogStorage::new();
    let service = service_with(Arc::new(storage.clone()), ReapPolicy::Persist);
    service
        .registry()
        .get_or_create("s1", "op-5", "a1", "OPERATION.log")
        .info("salvaged");

    let report = service
        .reaper()
        .sweep_at(Instant::now() + Duration::from_secs(31))
        .await;
    assert_eq!(report.rows_written, 1);
    let text = service
        .channel_log("s1", "op-5", "OPERATION.log")
        .await
        .expect("read");
    assert!(text.contains("salvaged"));
}
