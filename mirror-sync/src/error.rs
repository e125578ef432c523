//! Error types for mirror-sync.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// What kind of filesystem entry sits at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

impl EntryKind {
    /// Classify a file type without following symlinks.
    pub fn of(file_type: std::fs::FileType) -> Self {
        if file_type.is_symlink() {
            Self::Symlink
        } else if file_type.is_dir() {
            Self::Directory
        } else if file_type.is_file() {
            Self::File
        } else {
            Self::Other
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::File => "file",
            Self::Directory => "directory",
            Self::Symlink => "symlink",
            Self::Other => "special file",
        };
        f.write_str(label)
    }
}

/// All errors that can arise while mirroring a tree.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Open/read/write/copy/delete failure on a specific path.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A directory's children could not be listed.
    #[error("cannot enumerate {path}: {source}")]
    Enumeration {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// Source and replica disagree on the entry type at the same relative path.
    #[error("type conflict at {path}: {source_kind} in source, {replica_kind} in replica")]
    Conflict {
        path: PathBuf,
        source_kind: EntryKind,
        replica_kind: EntryKind,
    },

    /// A sync root is missing or unusable.
    #[error("invalid root {path}: {reason}")]
    InvalidRoot { path: PathBuf, reason: String },

    /// One root contains the other.
    #[error("source {source_root} and replica {replica_root} overlap")]
    OverlappingRoots {
        source_root: PathBuf,
        replica_root: PathBuf,
    },

    /// A walked path did not live under the root it was walked from.
    #[error("{path} is not inside {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },
}

impl SyncError {
    /// The path this error is about.
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Io { path, .. }
            | Self::Enumeration { path, .. }
            | Self::Conflict { path, .. }
            | Self::InvalidRoot { path, .. }
            | Self::OutsideRoot { path, .. } => path,
            Self::OverlappingRoots { replica_root, .. } => replica_root,
        }
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`SyncError::Enumeration`].
pub(crate) fn walk_err(fallback: &std::path::Path, source: walkdir::Error) -> SyncError {
    let path = source
        .path()
        .map(std::path::Path::to_path_buf)
        .unwrap_or_else(|| fallback.to_path_buf());
    SyncError::Enumeration { path, source }
}
