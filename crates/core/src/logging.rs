//! Tracing bootstrap for TacSync binaries.
//!
//! Two output shapes: human-readable lines for an operator's terminal and
//! JSON lines for field log collection. `RUST_LOG` overrides the level
//! chosen in code or config.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Human-readable output at `info` unless `RUST_LOG` says otherwise.
///
/// # Example
/// ```no_run
/// tacsync_core::logging::init();
/// tracing::info!("Client started");
/// ```
pub fn init() {
    install(LogFormat::Pretty, "info");
}

/// JSON output at `info` unless `RUST_LOG` says otherwise.
///
/// ```no_run
/// tacsync_core::logging::init_json();
/// tracing::info!(service = "tacsync-node", "Client started");
/// ```
pub fn init_json() {
    install(LogFormat::Json, "info");
}

/// Install the subscriber described by the `[logging]` config section.
pub fn init_from_config(config: &LoggingConfig) {
    install(config.format, &config.level);
}

// A second install in the same process is a no-op.
fn install(format: LogFormat, default_level: &str) {
    let registry = tracing_subscriber::registry().with(level_filter(default_level));
    let installed = match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .try_init(),
    };
    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

fn level_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}
