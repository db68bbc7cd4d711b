//! Logging configuration using tracing
//!
//! Everything goes to a daily rolling file; the terminal belongs to whatever
//! program embeds the engine.

use std::path::{Path, PathBuf};

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{Error, Result};

/// Environment variable holding the log filter directives.
pub const LOG_ENV_VAR: &str = "BRICK_LOG";

/// File name prefix of the rolling log files
pub const LOG_FILE_NAME: &str = "brickcommand.log";

const DEFAULT_FILTER: &str =
    "brickcommand=info,brick_core=info,brick_engine=info,brick_device=info,warn";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Install the global subscriber, logging under the platform data directory.
///
/// Logs are written to `<data_local_dir>/brickcommand/logs/`.
/// Log level is controlled by the `BRICK_LOG` environment variable.
///
/// # Examples
/// ```bash
/// BRICK_LOG=debug my-brick-app
/// BRICK_LOG=brick_engine=trace my-brick-app
/// ```
pub fn init() -> Result<()> {
    init_in(&log_directory())
}

/// Install the global subscriber, logging into `log_dir`.
///
/// Fails with [`Error::Config`] if a global subscriber is already set.
pub fn init_in(log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir)?;

    let file_layer = fmt::layer()
        .with_writer(RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_NAME))
        .with_ansi(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(fmt::time::ChronoLocal::new(TIMESTAMP_FORMAT.to_string()));

    tracing_subscriber::registry()
        .with(env_filter())
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::config(format!("Failed to install log subscriber: {}", e)))?;

    tracing::info!("Logging to {}", log_dir.display());
    Ok(())
}

/// Filter from `BRICK_LOG`, falling back to info for the brick crates
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("brickcommand")
        .join("logs")
}

/// Get the log file path prefix.
///
/// The daily appender adds a `.YYYY-MM-DD` suffix to each day's file.
pub fn get_current_log_file() -> PathBuf {
    log_directory().join(LOG_FILE_NAME)
}
