//! # mirror-sync
//!
//! One-way mirroring of a source directory tree onto a replica tree.
//!
//! Call [`sync`] once per pass. It copies new and changed files, creates
//! missing directories, deletes replica entries that no longer exist in the
//! source, and reports every change to the [`EventSink`] it is given.

pub mod error;
pub mod fingerprint;
pub mod paths;
pub mod reconcile;
pub mod report;
pub mod sink;

pub use error::{EntryKind, SyncError};
pub use fingerprint::{fingerprint, Fingerprint};
pub use reconcile::{sync, ConflictPolicy, SyncOptions};
pub use report::{Change, SyncFailure, SyncReport};
pub use sink::{EventSink, LogSink, MemorySink, SyncEvent};
