use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the scheduler runtime, logging setup, and configuration.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
