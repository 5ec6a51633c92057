use async_trait::async_trait;
use oplog_storage::{LogEntry, OperationLogStorage, StorageError, normalize_entries};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory operation log storage.
///
/// Cloning is cheap and every clone shares the same rows.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLogStorage {
    rows: Arc<RwLock<Vec<LogEntry>>>,
}

impl InMemoryLogStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Returns `true` if nothing has been stored.
    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Snapshot of every stored row in insertion order.
    pub async fn entries(&self) -> Vec<LogEntry> {
        self.rows.read().await.clone()
    }

    async fn select(&self, predicate: impl Fn(&LogEntry) -> bool) -> Vec<LogEntry> {
        let rows = self.rows.read().await;
        let matching = rows.iter().filter(|e| predicate(e)).cloned().collect();
        normalize_entries(matching)
    }
}

#[async_trait]
impl OperationLogStorage for InMemoryLogStorage {
    async fn insert(&self, entry: &LogEntry) -> Result<(), StorageError> {
        let mut rows = self.rows.write().await;
        if rows.iter().any(|existing| existing.id == entry.id) {
            return Err(StorageError::query_error(format!(
                "duplicate process_log id {}",
                entry.id
            )));
        }
        rows.push(entry.clone());
        Ok(())
    }

    async fn list_by_operation(
        &self,
        space: &str,
        operation_id: &str,
    ) -> Result<Vec<LogEntry>, StorageError> {
        Ok(self
            .select(|e| e.space == space && e.operation_id == operation_id)
            .await)
    }

    async fn list_by_operation_and_channel(
        &self,
        space: &str,
        operation_id: &str,
        channel: &str,
    ) -> Result<Vec<LogEntry>, StorageError> {
        Ok(self
            .select(|e| e.space == space && e.operation_id == operation_id && e.channel == channel)
            .await)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
