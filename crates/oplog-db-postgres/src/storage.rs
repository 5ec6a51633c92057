//! `OperationLogStorage` implementation backed by the `process_log` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx_postgres::PgPool;
use time::OffsetDateTime;
use tracing::{debug, instrument};

use oplog_storage::{LogEntry, OperationLogStorage, StorageError, normalize_entries};

use crate::config::PostgresConfig;
use crate::error::{PostgresError, Result};
use crate::{migrations, pool};

const INSERT_PROCESS_LOG: &str = r#"
    INSERT INTO process_log
        (id, space, namespace, modified, operation_id, operation_log, operation_log_name)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
"#;

const SELECT_BY_OPERATION: &str = r#"
    SELECT DISTINCT id, space, namespace, modified, operation_id, operation_log, operation_log_name
    FROM process_log
    WHERE space = $1 AND operation_id = $2
    ORDER BY modified ASC, id ASC
"#;

const SELECT_BY_OPERATION_AND_CHANNEL: &str = r#"
    SELECT DISTINCT id, space, namespace, modified, operation_id, operation_log, operation_log_name
    FROM process_log
    WHERE space = $1 AND operation_id = $2 AND operation_log_name = $3
    ORDER BY modified ASC, id ASC
"#;

type ProcessLogRow = (
    String,
    String,
    Option<String>,
    DateTime<Utc>,
    String,
    String,
    String,
);

/// PostgreSQL operation log storage.
#[derive(Debug, Clone)]
pub struct PostgresLogStorage {
    pool: PgPool,
}

impl PostgresLogStorage {
    /// Connects a pool and, if configured, runs the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created or a migration fails.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = pool::create_pool(config).await?;
        if config.run_migrations {
            migrations::run(&pool).await?;
        }
        Ok(Self::from_pool(pool))
    }

    /// Wraps an existing pool. The schema is assumed to be in place.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch(&self, sql: &str, binds: &[&str]) -> Result<Vec<LogEntry>> {
        let mut query = sqlx_core::query_as::query_as::<_, ProcessLogRow>(sql);
        for value in binds {
            query = query.bind(*value);
        }
        let rows = query.fetch_all(&self.pool).await?;
        let entries = rows
            .into_iter()
            .map(row_to_entry)
            .collect::<Result<Vec<_>>>()?;
        Ok(normalize_entries(entries))
    }
}

fn row_to_entry(row: ProcessLogRow) -> Result<LogEntry> {
    let (id, space, namespace, modified, operation_id, content, channel) = row;
    Ok(LogEntry {
        id,
        space,
        namespace,
        modified: chrono_to_time(modified)?,
        operation_id,
        channel,
        content,
    })
}

fn time_to_chrono(t: OffsetDateTime) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(t.unix_timestamp(), t.nanosecond())
        .ok_or_else(|| PostgresError::decode(format!("timestamp out of range: {t}")))
}

fn chrono_to_time(t: DateTime<Utc>) -> Result<OffsetDateTime> {
    let nanos = i128::from(t.timestamp()) * 1_000_000_000 + i128::from(t.timestamp_subsec_nanos());
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .map_err(|e| PostgresError::decode(format!("timestamp out of range: {e}")))
}

#[async_trait]
impl OperationLogStorage for PostgresLogStorage {
    #[instrument(skip(self, entry), fields(id = %entry.id, operation_id = %entry.operation_id, channel = %entry.channel))]
    async fn insert(&self, entry: &LogEntry) -> std::result::Result<(), StorageError> {
        let modified = time_to_chrono(entry.modified)?;

        sqlx_core::query::query(INSERT_PROCESS_LOG)
            .bind(&entry.id)
            .bind(&entry.space)
            .bind(&entry.namespace)
            .bind(modified)
            .bind(&entry.operation_id)
            .bind(&entry.content)
            .bind(&entry.channel)
            .execute(&self.pool)
            .await
            .map_err(PostgresError::from)?;

        debug!(bytes = entry.content.len(), "Inserted process log row");
        Ok(())
    }

    async fn list_by_operation(
        &self,
        space: &str,
        operation_id: &str,
    ) -> std::result::Result<Vec<LogEntry>, StorageError> {
        Ok(self
            .fetch(SELECT_BY_OPERATION, &[space, operation_id])
            .await?)
    }

    async fn list_by_operation_and_channel(
        &self,
        space: &str,
        operation_id: &str,
        channel: &str,
    ) -> std::result::Result<Vec<LogEntry>, StorageError> {
        Ok(self
            .fetch(SELECT_BY_OPERATION_AND_CHANNEL, &[space, operation_id, channel])
            .await?)
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
