use std::env;

use anyhow::Context as _;
use oplog_server::config::loader::{DEFAULT_CONFIG_FILE, load_config};
use oplog_server::observability::init_tracing;
use oplog_server::{build_registry, build_service};

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From OPLOG_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (oplog.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (OPLOG_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    let (config_path, source) = resolve_config_path();
    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    let registry = build_registry(&cfg).context("building process logger registry")?;
    let process_layer = oplog_capture::ProcessLogLayer::new(
        std::sync::Arc::clone(&registry),
        cfg.capture.default_channel_name(),
    );
    init_tracing(&cfg.logging.level, Some(process_layer));

    tracing::info!(
        path = %config_path,
        source = %source,
        "Configuration loaded"
    );

    let service = build_service(&cfg, registry)
        .await
        .context("initializing operation log service")?;
    let reaper = service.start_reaper();

    tracing::info!("Operation log service running");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("shutdown signal received");

    if let Some(handle) = reaper {
        handle.abort();
    }
    let pending = service.registry().len();
    if pending > 0 {
        tracing::warn!(pending, "Shutting down with unpersisted process loggers");
    }
    Ok(())
}

fn resolve_config_path() -> (String, ConfigSource) {
    // 1. Check CLI: --config <path>
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return (path, ConfigSource::CliArgument);
            }
        }
    }

    // 2. Check environment variable
    if let Ok(path) = env::var("OPLOG_CONFIG") {
        if !path.is_empty() {
            return (path, ConfigSource::EnvironmentVariable);
        }
    }

    (DEFAULT_CONFIG_FILE.to_string(), ConfigSource::Default)
}
