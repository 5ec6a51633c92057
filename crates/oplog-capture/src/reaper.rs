//! Periodic eviction of idle process loggers.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::{ReapPolicy, ReaperConfig};
use crate::persister::Persister;

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Loggers evicted by this sweep.
    pub reaped: usize,
    /// Buffered calls discarded under [`ReapPolicy::Drop`].
    pub dropped_lines: usize,
    /// Rows written under [`ReapPolicy::Persist`].
    pub rows_written: usize,
}

/// Evicts loggers that have not been written for longer than the idle
/// threshold. These belong to operations whose workflow never flushed them.
#[derive(Debug)]
pub struct Reaper {
    persister: Persister,
    config: ReaperConfig,
}

impl Reaper {
    pub fn new(persister: Persister, config: ReaperConfig) -> Self {
        Self { persister, config }
    }

    pub fn config(&self) -> &ReaperConfig {
        &self.config
    }

    /// Sweeps once against the current time.
    pub async fn sweep(&self) -> ReapReport {
        self.sweep_at(Instant::now()).await
    }

    /// Sweeps once, treating `now` as the current time.
    pub async fn sweep_at(&self, now: Instant) -> ReapReport {
        let threshold = self.config.idle_threshold();
        let idle: Vec<_> = self
            .persister
            .registry()
            .snapshot()
            .into_iter()
            .filter(|logger| now.saturating_duration_since(logger.last_write()) >= threshold)
            .collect();
        if idle.is_empty() {
            return ReapReport::default();
        }

        let claimed = self.persister.claim(idle);
        let mut report = ReapReport {
            reaped: claimed.len(),
            ..ReapReport::default()
        };

        match self.config.policy {
            ReapPolicy::Drop => {
                for logger in &claimed {
                    let (_, lines) = logger.drain();
                    if lines > 0 {
                        tracing::warn!(
                            logger = %logger.name(),
                            operation_id = %logger.operation_id(),
                            activity_id = %logger.activity_id(),
                            lines,
                            "Reaped idle process logger that was never persisted"
                        );
                    }
                    report.dropped_lines += lines;
                }
            }
            ReapPolicy::Persist => {
                for logger in &claimed {
                    tracing::warn!(
                        logger = %logger.name(),
                        operation_id = %logger.operation_id(),
                        activity_id = %logger.activity_id(),
                        "Persisting idle process logger before eviction"
                    );
                }
                match self.persister.write_claimed(&claimed).await {
                    Ok(persisted) => report.rows_written = persisted.rows_written,
                    Err(e) => tracing::error!(error = %e, "Failed to persist reaped process loggers"),
                }
            }
        }
        report
    }

    /// Spawns the periodic sweep. Returns `None` when the reaper is disabled.
    pub fn start(self: Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            tracing::info!("Process logger reaper is disabled");
            return None;
        }
        let period = self.config.interval();
        tracing::info!(
            interval_secs = period.as_secs(),
            idle_threshold_secs = self.config.idle_threshold_secs,
            policy = ?self.config.policy,
            "Starting process logger reaper"
        );

        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                let report = self.sweep().await;
                if report.reaped > 0 {
                    tracing::debug!(
                        reaped = report.reaped,
                        dropped_lines = report.dropped_lines,
                        rows_written = report.rows_written,
                        "Process logger sweep completed"
                    );
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::OriginFilter;
    use crate::layout::PatternLayout;
    use crate::logger::LogSink;
    use crate::registry::LoggerRegistry;
    use oplog_db_memory::InMemoryLogStorage;
    use std::time::Duration;

    fn setup(policy: ReapPolicy) -> (Arc<LoggerRegistry>, InMemoryLogStorage, Reaper) {
        let registry = Arc::new(LoggerRegistry::new(
            PatternLayout::parse("%m%n").unwrap(),
            OriginFilter::default(),
        ));
        let storage = InMemoryLogStorage::new();
        let persister = Persister::new(Arc::clone(&registry), Arc::new(storage.clone()));
        let config = ReaperConfig {
            idle_threshold_secs: 60,
            policy,
            ..ReaperConfig::default()
        };
        (registry, storage, Reaper::new(persister, config))
    }

    #[tokio::test]
    async fn test_fresh_loggers_survive() {
        let (registry, _, reaper) = setup(ReapPolicy::Drop);
        registry.get_or_create("s1", "op-1", "a1", "OPERATION.log").info("busy");

        let report = reaper.sweep().await;
        assert_eq!(report, ReapReport::default());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_drop_policy_discards() {
        let (registry, storage, reaper) = setup(ReapPolicy::Drop);
        let handle = registry.get_or_create("s1", "op-1", "a1", "OPERATION.log");
        handle.info("abandoned");
        handle.info("still abandoned");

        let later = Instant::now() + Duration::from_secs(61);
        let report = reaper.sweep_at(later).await;
        assert_eq!(report.reaped, 1);
        assert_eq!(report.dropped_lines, 2);
        assert!(registry.find_all("op-1", "a1").is_empty());
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn test_persist_policy_writes_then_evicts() {
        let (registry, storage, reaper) = setup(ReapPolicy::Persist);
        registry.get_or_create("s1", "op-1", "a1", "OPERATION.log").info("salvaged");

        let later = Instant::now() + Duration::from_secs(61);
        let report = reaper.sweep_at(later).await;
        assert_eq!(report.reaped, 1);
        assert_eq!(report.rows_written, 1);
        assert!(registry.is_empty());
        assert_eq!(storage.entries().await[0].content, "salvaged\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_sweep_reaps_idle_loggers() {
        let (registry, storage, reaper) = setup(ReapPolicy::Persist);
        let reaper = Reaper::new(
            reaper.persister.clone(),
            ReaperConfig {
                interval_secs: 30,
                ..reaper.config.clone()
            },
        );
        registry.get_or_create("s1", "op-1", "a1", "OPERATION.log").info("forgotten");

        let handle = Arc::new(reaper).start().expect("enabled by default");
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(registry.find_all("op-1", "a1").len(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(registry.find_all("op-1", "a1").is_empty());
        assert_eq!(storage.entries().await[0].content, "forgotten\n");
        handle.abort();
    }

    #[tokio::test]
    async fn test_disabled_reaper_does_not_start() {
        let (_, _, reaper) = setup(ReapPolicy::Drop);
        let disabled = Reaper::new(
            reaper.persister.clone(),
            ReaperConfig {
                enabled: false,
                ..ReaperConfig::default()
            },
        );
        assert!(Arc::new(disabled).start().is_none());

        let handle = Arc::new(reaper).start().expect("enabled by default");
        handle.abort();
    }
}
