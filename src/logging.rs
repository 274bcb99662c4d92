//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install a fmt subscriber filtered at the configured level.
///
/// `RUST_LOG` takes precedence when set. Installing twice is a no-op, so hosts
/// that already own a subscriber can call this safely.
pub fn init(config: &LoggingConfig) {
    let level = config.level.to_tracing_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
