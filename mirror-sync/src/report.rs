//! Per-pass outcome: structural changes and the run summary.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::EntryKind;

/// One structural change to the replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    DirectoryCreated { path: PathBuf },
    FileCopied { from: PathBuf, to: PathBuf },
    FileRemoved { path: PathBuf },
    DirectoryRemoved { path: PathBuf },
    /// A replica entry of the wrong type was deleted so it can be recreated.
    Replaced { path: PathBuf, was: EntryKind },
}

impl Change {
    /// Human-readable description; `planned` phrases it for a dry run.
    pub fn describe(&self, planned: bool) -> String {
        match (self, planned) {
            (Self::DirectoryCreated { path }, false) => {
                format!("Created directory: {}", path.display())
            }
            (Self::DirectoryCreated { path }, true) => {
                format!("Would create directory: {}", path.display())
            }
            (Self::FileCopied { from, to }, false) => {
                format!("Copied file: {} to {}", from.display(), to.display())
            }
            (Self::FileCopied { from, to }, true) => {
                format!("Would copy file: {} to {}", from.display(), to.display())
            }
            (Self::FileRemoved { path }, false) => format!("Removed file: {}", path.display()),
            (Self::FileRemoved { path }, true) => {
                format!("Would remove file: {}", path.display())
            }
            (Self::DirectoryRemoved { path }, false) => {
                format!("Removed directory: {}", path.display())
            }
            (Self::DirectoryRemoved { path }, true) => {
                format!("Would remove directory: {}", path.display())
            }
            (Self::Replaced { path, was }, false) => {
                format!("Replaced conflicting {was}: {}", path.display())
            }
            (Self::Replaced { path, was }, true) => {
                format!("Would replace conflicting {was}: {}", path.display())
            }
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe(false))
    }
}

/// A recovered per-entry failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Summary of one sync pass.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub source: PathBuf,
    pub replica: PathBuf,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u128,
    pub directories_created: usize,
    pub files_copied: usize,
    pub files_unchanged: usize,
    pub files_removed: usize,
    pub directories_removed: usize,
    pub conflicts_replaced: usize,
    pub failures: Vec<SyncFailure>,
    /// Set when a run-level error stopped the pass early.
    pub aborted: Option<String>,
}

impl SyncReport {
    pub(crate) fn new(source: PathBuf, replica: PathBuf, dry_run: bool) -> Self {
        Self {
            source,
            replica,
            dry_run,
            started_at: Utc::now(),
            duration_ms: 0,
            directories_created: 0,
            files_copied: 0,
            files_unchanged: 0,
            files_removed: 0,
            directories_removed: 0,
            conflicts_replaced: 0,
            failures: Vec::new(),
            aborted: None,
        }
    }

    pub(crate) fn count(&mut self, change: &Change) {
        match change {
            Change::DirectoryCreated { .. } => self.directories_created += 1,
            Change::FileCopied { .. } => self.files_copied += 1,
            Change::FileRemoved { .. } => self.files_removed += 1,
            Change::DirectoryRemoved { .. } => self.directories_removed += 1,
            Change::Replaced { .. } => self.conflicts_replaced += 1,
        }
    }

    /// Number of structural changes performed (or planned, for a dry run).
    pub fn mutations(&self) -> usize {
        self.directories_created
            + self.files_copied
            + self.files_removed
            + self.directories_removed
            + self.conflicts_replaced
    }

    /// True when the pass ran to completion without any failure.
    pub fn is_clean(&self) -> bool {
        self.aborted.is_none() && self.failures.is_empty()
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} copied, {} unchanged, {} removed, {} failed in {} ms",
            self.directories_created,
            self.files_copied,
            self.files_unchanged,
            self.files_removed + self.directories_removed,
            self.failures.len(),
            self.duration_ms,
        )
    }
}
