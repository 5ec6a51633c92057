// Tracing initialization with the process log bridge.
use oplog_capture::ProcessLogLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs the global subscriber. Events inside process-scoped spans are
/// also routed to `process_layer` when given.
pub fn init_tracing(level: &str, process_layer: Option<ProcessLogLayer>) {
    // Prefer RUST_LOG from env, otherwise use provided level string.
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(process_layer)
        .try_init();
}
