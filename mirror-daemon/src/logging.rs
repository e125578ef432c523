//! Subscriber setup: console plus a rotating log file.
//!
//! `mirror-sync` logs through the `log` facade; the subscriber's
//! `tracing-log` bridge picks those records up, so one filter covers both.

use std::fs;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::LogConfig;
use crate::error::{io_err, DaemonError};
use crate::log_rotation::RotatingFile;

/// Install the global subscriber described by `config`.
///
/// The filter comes from `RUST_LOG` and defaults to `info`.
pub fn init_logging(config: &LogConfig) -> Result<RotatingFile, DaemonError> {
    let file = open_log_file(config)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = if config.json {
        fmt::layer()
            .json()
            .with_writer(file.clone())
            .boxed()
    } else {
        fmt::layer()
            .with_ansi(false)
            .with_writer(file.clone())
            .boxed()
    };
    let console_layer = config.console.then(|| fmt::layer().with_target(false));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| DaemonError::Logging(e.to_string()))?;

    Ok(file)
}

/// Create the log directory if needed and open the rotating file.
pub fn open_log_file(config: &LogConfig) -> Result<RotatingFile, DaemonError> {
    if let Some(dir) = config.path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
    }
    RotatingFile::open(&config.path, config.max_bytes, config.max_files)
        .map_err(|e| io_err(&config.path, e))
}
