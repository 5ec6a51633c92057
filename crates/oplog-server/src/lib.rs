//! Host process for operation log capture.
//!
//! Loads [`config::AppConfig`], installs tracing with the process log
//! bridge, connects storage and runs the idle logger reaper.

pub mod bootstrap;
pub mod config;
pub mod observability;

pub use bootstrap::{BootstrapError, build_registry, build_service, build_storage};
pub use config::{AppConfig, LoggingConfig, StorageBackend, StorageConfig};
