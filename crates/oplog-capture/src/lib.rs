//! # oplog-capture
//!
//! Per-operation log capture for long-running deployment operations.
//!
//! Steps of an operation obtain a [`ProcessLogger`] scoped to
//! (space, operation, activity, channel) from the [`LoggerRegistry`] and
//! write level-tagged calls into its in-memory buffer. When a step
//! completes, the workflow engine asks the [`Persister`] to flush that
//! activity: the matching loggers are evicted from the registry, their text
//! is merged per channel and one row per channel is written through the
//! storage backend. A [`Reaper`] evicts loggers that were never flushed.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use oplog_capture::{CaptureConfig, ExecutionContext, LogSink, OperationLogService};
//! use oplog_db_memory::InMemoryLogStorage;
//!
//! # async fn example() -> oplog_capture::Result<()> {
//! let service = OperationLogService::new(
//!     CaptureConfig::default(),
//!     Arc::new(InMemoryLogStorage::new()),
//! )?;
//!
//! let ctx = ExecutionContext::new("space-1", "op-42").with_task_id("upload");
//! let logger = service.logger(&ctx);
//! logger.info("Uploading application");
//!
//! service.persist(ctx.operation_id(), ctx.activity_id()).await?;
//! let text = service.channel_log("space-1", "op-42", "OPERATION.log").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`layout`]: pattern layout formatting each call
//! - [`filter`]: origin filter dropping infrastructure noise
//! - [`registry`]: concurrent logger registry
//! - [`persister`]: flushing loggers into rows
//! - [`reaper`]: idle logger eviction
//! - [`layer`]: tracing bridge

pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod filter;
pub mod layer;
pub mod layout;
pub mod logger;
pub mod persister;
pub mod reaper;
pub mod registry;
pub mod service;

pub use config::{CaptureConfig, FilterConfig, ReapPolicy, ReaperConfig};
pub use context::ExecutionContext;
pub use error::{CaptureError, Result};
pub use event::{LogEvent, LogLevel};
pub use filter::OriginFilter;
pub use layer::ProcessLogLayer;
pub use layout::{DEFAULT_LAYOUT, LogContext, PatternLayout};
pub use logger::{LogSink, NullProcessLogger, ProcessLogger, ProcessLoggerHandle};
pub use persister::{PersistReport, PersistTask, Persister};
pub use reaper::{ReapReport, Reaper};
pub use registry::{LoggerKey, LoggerRegistry};
pub use service::OperationLogService;
