//! Event sink — where the reconciler reports what it did.
//!
//! The sink is passed into [`crate::sync`] explicitly, so tests can capture
//! events with [`MemorySink`] while the binary forwards them to the log
//! facade through [`LogSink`].

use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use tracing::Level;

use crate::report::{Change, SyncReport};

/// Log target used by [`LogSink`].
pub const LOG_TARGET: &str = "mirror";

/// Everything a sync pass reports.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    RunStarted {
        source: PathBuf,
        replica: PathBuf,
        dry_run: bool,
    },
    /// A change applied to the replica.
    Change(Change),
    /// A change a dry run would have applied.
    WouldChange(Change),
    /// A per-entry failure; the pass continued.
    Failed { path: PathBuf, error: String },
    /// A run-level failure; the pass stopped.
    RunAborted { error: String },
    RunCompleted(SyncReport),
}

impl SyncEvent {
    pub fn level(&self) -> Level {
        match self {
            Self::Failed { .. } | Self::RunAborted { .. } => Level::Error,
            Self::Change(Change::Replaced { .. }) | Self::WouldChange(Change::Replaced { .. }) => {
                Level::Warn
            }
            _ => Level::Info,
        }
    }

    /// The change carried by this event, applied or planned.
    pub fn change(&self) -> Option<&Change> {
        match self {
            Self::Change(change) | Self::WouldChange(change) => Some(change),
            _ => None,
        }
    }
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunStarted {
                source,
                replica,
                dry_run,
            } => {
                let suffix = if *dry_run { " (dry run)" } else { "" };
                write!(
                    f,
                    "Starting synchronization: {} -> {}{suffix}",
                    source.display(),
                    replica.display()
                )
            }
            Self::Change(change) => f.write_str(&change.describe(false)),
            Self::WouldChange(change) => f.write_str(&change.describe(true)),
            Self::Failed { path, error } => write!(f, "Failed at {}: {error}", path.display()),
            Self::RunAborted { error } => write!(f, "Synchronization aborted: {error}"),
            Self::RunCompleted(report) => write!(f, "Synchronization complete: {report}"),
        }
    }
}

/// Receiver of sync events.
pub trait EventSink {
    fn record(&self, event: &SyncEvent);
}

impl<F> EventSink for F
where
    F: Fn(&SyncEvent),
{
    fn record(&self, event: &SyncEvent) {
        self(event)
    }
}

/// Forwards events to the `log` facade under [`LOG_TARGET`].
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn record(&self, event: &SyncEvent) {
        tracing::log!(target: LOG_TARGET, event.level(), "{event}");
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<SyncEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SyncEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Structural changes only, applied or planned.
    pub fn changes(&self) -> Vec<Change> {
        self.events()
            .iter()
            .filter_map(SyncEvent::change)
            .cloned()
            .collect()
    }

    /// Rendered messages of every event at `level`.
    pub fn messages_at(&self, level: Level) -> Vec<String> {
        self.events()
            .iter()
            .filter(|event| event.level() == level)
            .map(ToString::to_string)
            .collect()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: &SyncEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
