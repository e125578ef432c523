//! Tree reconciler — makes the replica an exact mirror of the source.
//!
//! A pass has two phases:
//!
//! 1. **Propagate** — walk the source top-down, create missing replica
//!    directories and copy files that are new or whose content differs.
//! 2. **Prune** — walk the replica bottom-up and delete entries that no
//!    longer exist in the source.
//!
//! Per-entry failures are reported to the sink and the walk moves on. Only
//! root-level failures abort a pass. [`sync`] never returns an error.

use std::fs::{self, File};
use std::io::{self, ErrorKind};
use std::path::Path;
use std::time::Instant;

use filetime::FileTime;
use walkdir::{DirEntry, WalkDir};

use crate::error::{io_err, walk_err, EntryKind, SyncError};
use crate::fingerprint::files_differ;
use crate::paths::Roots;
use crate::report::{Change, SyncFailure, SyncReport};
use crate::sink::{EventSink, SyncEvent};

/// Name prefix of the uniquely named sibling a copy is staged in.
pub const TMP_PREFIX: &str = ".mirror-";

/// What to do when source and replica disagree on an entry's type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Delete the replica entry and recreate it from the source.
    #[default]
    Replace,
    /// Leave the replica entry alone and report a conflict error.
    Report,
}

/// Knobs for a sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Walk and compare, but do not touch the replica.
    pub dry_run: bool,
    /// Delete replica directories that have no source counterpart.
    pub prune_empty_dirs: bool,
    pub on_conflict: ConflictPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            prune_empty_dirs: true,
            on_conflict: ConflictPolicy::Replace,
        }
    }
}

/// Run one sync pass from `source` onto `replica`.
pub fn sync<S>(source: &Path, replica: &Path, sink: &S, options: &SyncOptions) -> SyncReport
where
    S: EventSink + ?Sized,
{
    let started = Instant::now();
    sink.record(&SyncEvent::RunStarted {
        source: source.to_path_buf(),
        replica: replica.to_path_buf(),
        dry_run: options.dry_run,
    });

    let mut pass = Pass {
        sink,
        options,
        report: SyncReport::new(source.to_path_buf(), replica.to_path_buf(), options.dry_run),
    };

    let outcome = Roots::resolve(source, replica).and_then(|roots| {
        pass.report.source = roots.source.clone();
        pass.report.replica = roots.replica.clone();
        pass.propagate(&roots)?;
        pass.prune(&roots)
    });

    let Pass { mut report, .. } = pass;
    if let Err(err) = outcome {
        let error = err.to_string();
        sink.record(&SyncEvent::RunAborted {
            error: error.clone(),
        });
        report.aborted = Some(error);
    }
    report.duration_ms = started.elapsed().as_millis();
    sink.record(&SyncEvent::RunCompleted(report.clone()));
    report
}

struct Pass<'a, S: ?Sized> {
    sink: &'a S,
    options: &'a SyncOptions,
    report: SyncReport,
}

impl<S> Pass<'_, S>
where
    S: EventSink + ?Sized,
{
    // -----------------------------------------------------------------------
    // Phase A — source → replica
    // -----------------------------------------------------------------------

    fn propagate(&mut self, roots: &Roots) -> Result<(), SyncError> {
        let mut walker = WalkDir::new(&roots.source).follow_links(false).into_iter();

        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => return Err(walk_err(&roots.source, err)),
                Err(err) => {
                    self.fail(walk_err(&roots.source, err));
                    continue;
                }
            };
            let mirrored = match roots.to_replica(entry.path()) {
                Ok(path) => path,
                Err(err) => {
                    self.fail(err);
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                if let Err(err) = self.mirror_directory(&mirrored) {
                    if entry.depth() == 0 {
                        return Err(err);
                    }
                    self.fail(err);
                    walker.skip_current_dir();
                }
            } else if is_copyable(&entry) {
                if let Err(err) = self.mirror_file(entry.path(), &mirrored) {
                    self.fail(err);
                }
            } else {
                tracing::debug!("skipping {}: not a regular file", entry.path().display());
            }
        }
        Ok(())
    }

    fn mirror_directory(&mut self, target: &Path) -> Result<(), SyncError> {
        match self.replica_entry(target)? {
            Some(meta) if meta.is_dir() => return Ok(()),
            Some(meta) => self.resolve_conflict(target, EntryKind::Directory, &meta)?,
            None => {}
        }

        if !self.options.dry_run {
            fs::create_dir_all(target).map_err(|e| io_err(target, e))?;
        }
        self.apply(Change::DirectoryCreated {
            path: target.to_path_buf(),
        });
        Ok(())
    }

    fn mirror_file(&mut self, source: &Path, target: &Path) -> Result<(), SyncError> {
        let needs_copy = match self.replica_entry(target)? {
            None => true,
            Some(meta) if meta.is_file() => files_differ(source, target)?,
            Some(meta) => {
                self.resolve_conflict(target, EntryKind::File, &meta)?;
                true
            }
        };

        if !needs_copy {
            self.report.files_unchanged += 1;
            return Ok(());
        }

        if !self.options.dry_run {
            copy_file(source, target)?;
        }
        self.apply(Change::FileCopied {
            from: source.to_path_buf(),
            to: target.to_path_buf(),
        });
        Ok(())
    }

    /// Metadata of a replica entry, or `None` if it does not exist yet.
    ///
    /// On a dry run, an entry below a parent that is still a file counts as
    /// missing: the real pass would have replaced that parent first.
    fn replica_entry(&self, target: &Path) -> Result<Option<fs::Metadata>, SyncError> {
        match fs::symlink_metadata(target) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(_) if self.options.dry_run && !target.parent().is_some_and(Path::is_dir) => {
                Ok(None)
            }
            Err(e) => Err(io_err(target, e)),
        }
    }

    /// Handle a replica entry whose type does not match the source.
    ///
    /// Returns `Ok` once the entry is gone (or would be, on a dry run).
    fn resolve_conflict(
        &mut self,
        target: &Path,
        expected: EntryKind,
        found: &fs::Metadata,
    ) -> Result<(), SyncError> {
        let was = EntryKind::of(found.file_type());
        if self.options.on_conflict == ConflictPolicy::Report {
            return Err(SyncError::Conflict {
                path: target.to_path_buf(),
                source_kind: expected,
                replica_kind: was,
            });
        }

        if !self.options.dry_run {
            let removed = if was == EntryKind::Directory {
                fs::remove_dir_all(target)
            } else {
                fs::remove_file(target)
            };
            removed.map_err(|e| io_err(target, e))?;
        }
        self.apply(Change::Replaced {
            path: target.to_path_buf(),
            was,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Phase B — replica → source
    // -----------------------------------------------------------------------

    fn prune(&mut self, roots: &Roots) -> Result<(), SyncError> {
        // An unmounted or deleted source must not wipe the replica.
        match fs::metadata(&roots.source) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(SyncError::InvalidRoot {
                    path: roots.source.clone(),
                    reason: "source stopped being a directory during the pass".to_string(),
                })
            }
            Err(e) => {
                return Err(SyncError::InvalidRoot {
                    path: roots.source.clone(),
                    reason: format!("source vanished during the pass: {e}"),
                })
            }
        }

        if self.options.dry_run && !roots.replica.exists() {
            return Ok(());
        }

        let walker = WalkDir::new(&roots.replica)
            .follow_links(false)
            .contents_first(true)
            .into_iter();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => return Err(walk_err(&roots.replica, err)),
                Err(err) => {
                    self.fail(walk_err(&roots.replica, err));
                    continue;
                }
            };
            if entry.depth() == 0 {
                continue;
            }

            let counterpart = match roots.to_source(entry.path()) {
                Ok(path) => path,
                Err(err) => {
                    self.fail(err);
                    continue;
                }
            };
            match fs::symlink_metadata(&counterpart) {
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    self.fail(io_err(&counterpart, e));
                    continue;
                }
            }

            if let Err(err) = self.remove_orphan(&entry) {
                self.fail(err);
            }
        }
        Ok(())
    }

    fn remove_orphan(&mut self, entry: &DirEntry) -> Result<(), SyncError> {
        let path = entry.path();
        if entry.file_type().is_dir() {
            if !self.options.prune_empty_dirs {
                return Ok(());
            }
            if !self.options.dry_run {
                fs::remove_dir(path).map_err(|e| io_err(path, e))?;
            }
            self.apply(Change::DirectoryRemoved {
                path: path.to_path_buf(),
            });
        } else {
            if !self.options.dry_run {
                fs::remove_file(path).map_err(|e| io_err(path, e))?;
            }
            self.apply(Change::FileRemoved {
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reporting
    // -----------------------------------------------------------------------

    fn apply(&mut self, change: Change) {
        self.report.count(&change);
        let event = if self.options.dry_run {
            SyncEvent::WouldChange(change)
        } else {
            SyncEvent::Change(change)
        };
        self.sink.record(&event);
    }

    fn fail(&mut self, err: SyncError) {
        let failure = SyncFailure {
            path: err.path().to_path_buf(),
            error: err.to_string(),
        };
        self.sink.record(&SyncEvent::Failed {
            path: failure.path.clone(),
            error: failure.error.clone(),
        });
        self.report.failures.push(failure);
    }
}

/// Regular files, and symlinks that resolve to regular files.
fn is_copyable(entry: &DirEntry) -> bool {
    let file_type = entry.file_type();
    if file_type.is_file() {
        return true;
    }
    file_type.is_symlink()
        && fs::metadata(entry.path())
            .map(|meta| meta.is_file())
            .unwrap_or(false)
}

/// Copy `source` over `target` through a uniquely named temporary sibling
/// and a rename, so the replica never holds a half-written file under the
/// final name. The staged file is deleted on every error path.
pub(crate) fn copy_file(source: &Path, target: &Path) -> Result<(), SyncError> {
    let parent = target.parent().ok_or_else(|| SyncError::InvalidRoot {
        path: target.to_path_buf(),
        reason: "copy target has no parent directory".to_string(),
    })?;

    let mut input = File::open(source).map_err(|e| io_err(source, e))?;
    let meta = input.metadata().map_err(|e| io_err(source, e))?;

    let mut staged = tempfile::Builder::new()
        .prefix(TMP_PREFIX)
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| io_err(parent, e))?;
    io::copy(&mut input, staged.as_file_mut()).map_err(|e| io_err(source, e))?;
    staged
        .as_file()
        .set_permissions(meta.permissions())
        .map_err(|e| io_err(staged.path(), e))?;

    // Timestamps are best-effort; content is what the mirror guarantees.
    let atime = FileTime::from_last_access_time(&meta);
    let mtime = FileTime::from_last_modification_time(&meta);
    if let Err(e) = filetime::set_file_handle_times(staged.as_file(), Some(atime), Some(mtime)) {
        tracing::debug!("could not carry timestamps to {}: {e}", target.display());
    }

    staged
        .persist(target)
        .map_err(|e| io_err(target, e.error))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
