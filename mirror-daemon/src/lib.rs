//! Periodic mirror runtime: interval scheduler, logging setup, configuration.

pub mod config;
mod error;
pub mod log_rotation;
mod logging;
mod runtime;

pub use config::{LogConfig, MirrorConfig, DEFAULT_LOG_BACKUPS, DEFAULT_MAX_LOG_BYTES};
pub use error::DaemonError;
pub use log_rotation::RotatingFile;
pub use logging::{init_logging, open_log_file};
pub use runtime::{
    run, run_once, spawn, spawn_with_sink, start_blocking, SchedulerHandle, SharedSink,
};
