use std::sync::Arc;

use oplog_capture::{LogSink, LoggerRegistry, Persister};
use oplog_db_memory::InMemoryLogStorage;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_get_or_create_yields_one_instance() {
    let registry = Arc::new(LoggerRegistry::default());

    let mut tasks = Vec::new();
    for _ in 0..64 {
        let registry = Arc::clone(&registry);
        tasks.push(tokio::spawn(async move {
            registry
                .get_or_create("s1", "op-1", "a1", "OPERATION.log")
                .into_active()
                .expect("active logger")
        }));
    }

    let mut loggers = Vec::new();
    for task in tasks {
        loggers.push(task.await.expect("task"));
    }
    assert!(loggers.iter().all(|l| Arc::ptr_eq(l, &loggers[0])));
    assert_eq!(registry.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_persist_writes_buffer_once() {
    let registry = Arc::new(LoggerRegistry::default());
    let storage = InMemoryLogStorage::new();
    let persister = Persister::new(Arc::clone(&registry), Arc::new(storage.clone()));

    let logger = registry.get_or_create("s1", "op-1", "a1", "OPERATION.log");
    for i in 0..100 {
        logger.info(&format!("line {i}"));
    }

    let tasks: Vec<_> = (0..8)
        .map(|_| persister.persist_in_background("op-1", "a1"))
        .collect();
    let mut rows = 0;
    for task in tasks {
        rows += task.wait().await.expect("persist").rows_written;
    }

    assert_eq!(rows, 1);
    let entries = storage.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].content.matches("line ").count(), 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_operations_persist_in_parallel() {
    let registry = Arc::new(LoggerRegistry::default());
    let storage = InMemoryLogStorage::new();
    let persister = Persister::new(Arc::clone(&registry), Arc::new(storage.clone()));

    let mut tasks = Vec::new();
    for op in 0..16 {
        let registry = Arc::clone(&registry);
        let persister = persister.clone();
        tasks.push(tokio::spawn(async move {
            let operation_id = format!("op-{op}");
            let logger = registry.get_or_create("s1", &operation_id, "a1", "OPERATION.log");
            logger.info("working");
            persister.persist(&operation_id, "a1").await
        }));
    }
    for task in tasks {
        let report = task.await.expect("task").expect("persist");
        assert_eq!(report.rows_written, 1);
    }

    assert!(registry.is_empty());
    assert_eq!(storage.len().await, 16);
}

#[test]
fn removal_races_never_evict_a_newer_logger() {
    let registry = Arc::new(LoggerRegistry::default());
    let stale = registry
        .get_or_create("s1", "op-1", "a1", "OPERATION.log")
        .into_active()
        .expect("active");

    std::thread::scope(|scope| {
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            let stale = Arc::clone(&stale);
            scope.spawn(move || {
                registry.remove(&stale);
            });
        }
    });

    let fresh = registry
        .get_or_create("s1", "op-1", "a1", "OPERATION.log")
        .into_active()
        .expect("active");
    assert!(!registry.remove(&stale));
    assert!(Arc::ptr_eq(&registry.find_all("op-1", "a1")[0], &fresh));
}
