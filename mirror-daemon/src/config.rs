use std::path::{Path, PathBuf};
use std::time::Duration;

use mirror_sync::SyncOptions;

use crate::error::DaemonError;

/// Rotate the log file once it reaches this size (10 KiB).
pub const DEFAULT_MAX_LOG_BYTES: u64 = 10 * 1024;

/// Rotated log copies kept next to the live file.
pub const DEFAULT_LOG_BACKUPS: usize = 5;

/// Log file settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub path: PathBuf,
    pub max_bytes: u64,
    pub max_files: usize,
    /// Also write human-readable lines to stdout.
    pub console: bool,
    /// Write JSON lines to the log file instead of plain text.
    pub json: bool,
}

impl LogConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_bytes: DEFAULT_MAX_LOG_BYTES,
            max_files: DEFAULT_LOG_BACKUPS,
            console: true,
            json: false,
        }
    }
}

/// Everything the mirror process needs to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    pub source: PathBuf,
    pub replica: PathBuf,
    pub interval: Duration,
    pub options: SyncOptions,
    pub log: LogConfig,
}

impl MirrorConfig {
    pub fn new(
        source: impl Into<PathBuf>,
        replica: impl Into<PathBuf>,
        interval: Duration,
        log_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source: source.into(),
            replica: replica.into(),
            interval,
            options: SyncOptions::default(),
            log: LogConfig::new(log_path),
        }
    }

    /// Reject configurations that can never produce a useful pass.
    ///
    /// Root existence is checked per pass, since a source may appear later.
    pub fn validate(&self) -> Result<(), DaemonError> {
        if self.interval.is_zero() {
            return Err(DaemonError::Config(
                "interval must be greater than zero".to_string(),
            ));
        }
        if same_path(&self.source, &self.replica) {
            return Err(DaemonError::Config(format!(
                "source and replica are the same path: {}",
                self.source.display()
            )));
        }
        if self.log.max_bytes == 0 {
            return Err(DaemonError::Config(
                "maximum log size must be greater than zero".to_string(),
            ));
        }
        if self.log.path.as_os_str().is_empty() {
            return Err(DaemonError::Config("log path is empty".to_string()));
        }
        Ok(())
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
