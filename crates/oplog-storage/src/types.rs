//! Storage types for the operation log storage layer.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use time::OffsetDateTime;
use uuid::Uuid;

/// One durable `process_log` row.
///
/// A row holds the merged text of every logger of one channel drained by a
/// single flush. The same `(operation_id, channel)` pair appears once per
/// flush, so readers must concatenate rows in `modified` order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unique row id, generated at persist time.
    pub id: String,
    /// Tenant scope the operation runs in.
    pub space: String,
    /// Optional further scoping inside the space.
    pub namespace: Option<String>,
    /// Correlation id shared by all entries of one operation.
    pub operation_id: String,
    /// Logical log name, e.g. `OPERATION.log`.
    pub channel: String,
    /// Formatted log text.
    pub content: String,
    /// Write time, used for ordering.
    #[serde(with = "time::serde::rfc3339")]
    pub modified: OffsetDateTime,
}

impl LogEntry {
    /// Creates a new entry with a fresh id, stamped with the current time.
    #[must_use]
    pub fn new(
        space: impl Into<String>,
        operation_id: impl Into<String>,
        channel: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            space: space.into(),
            namespace: None,
            operation_id: operation_id.into(),
            channel: channel.into(),
            content: content.into(),
            modified: OffsetDateTime::now_utc(),
        }
    }

    /// Sets the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    /// Overrides the write time.
    #[must_use]
    pub fn with_modified(mut self, modified: OffsetDateTime) -> Self {
        self.modified = modified;
        self
    }
}

/// Orders entries by `modified` ascending and drops repeated ids.
///
/// The sort is stable, so rows sharing a timestamp keep the order the
/// backend returned them in. The first occurrence of an id wins.
pub fn normalize_entries(mut entries: Vec<LogEntry>) -> Vec<LogEntry> {
    entries.sort_by_key(|entry| entry.modified);
    let mut seen = HashSet::with_capacity(entries.len());
    entries.retain(|entry| seen.insert(entry.id.clone()));
    entries
}

/// Concatenates the content of already ordered entries.
pub fn merge_content(entries: &[LogEntry]) -> String {
    let capacity = entries.iter().map(|e| e.content.len()).sum();
    entries
        .iter()
        .fold(String::with_capacity(capacity), |mut merged, entry| {
            merged.push_str(&entry.content);
            merged
        })
}
