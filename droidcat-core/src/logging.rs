//! Tracing subscriber setup

use crate::config::LoggingConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn install(filter: EnvFilter) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

/// Initialize logging from `RUST_LOG`, defaulting to `info`
pub fn init_logging() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    install(filter)?;
    tracing::debug!("Logging initialized");
    Ok(())
}

/// Initialize logging with a fixed level, ignoring `RUST_LOG`
pub fn init_logging_with_level(level: &str) -> anyhow::Result<()> {
    install(EnvFilter::try_new(level)?)?;
    tracing::debug!("Logging initialized with level: {}", level);
    Ok(())
}

/// `RUST_LOG` wins over the configured level when set
pub fn init_logging_from_config(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))?;
    install(filter)
}
