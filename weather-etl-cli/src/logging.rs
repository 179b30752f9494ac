use anyhow::{Context, Result};
use std::{fs, path::Path};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_FILE_PREFIX: &str = "weather_etl";
pub const LOG_FILE_SUFFIX: &str = "log";
/// Daily files kept on disk; older ones are pruned at rollover.
pub const MAX_LOG_FILES: usize = 5;

/// Console plus a daily-rolling file in `log_dir`. `RUST_LOG` overrides the level.
///
/// Keep the returned guard alive until exit or buffered file lines are lost.
pub fn init(log_dir: &Path, verbose: bool) -> Result<WorkerGuard> {
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender(log_dir)?);

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

/// `weather_etl.<date>.log` files under `log_dir`, at most [`MAX_LOG_FILES`] of them.
pub fn file_appender(log_dir: &Path) -> Result<RollingFileAppender> {
    let dir = log_dir.display();
    fs::create_dir_all(log_dir).with_context(|| format!("Failed to create log directory: {dir}"))?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .max_log_files(MAX_LOG_FILES)
        .build(log_dir)
        .with_context(|| format!("Failed to create log file in {dir}"))
}
