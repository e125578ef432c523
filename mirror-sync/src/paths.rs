//! Root resolution and mirrored-path mapping.
//!
//! Mirrored paths are computed by stripping the walked root and joining the
//! remainder onto the other root, never by textual prefix replacement.

use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{io_err, SyncError};

/// The two absolute roots of a sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roots {
    pub source: PathBuf,
    pub replica: PathBuf,
}

impl Roots {
    /// Validate and absolutize both roots.
    ///
    /// The source must be an enumerable directory. The replica may not exist
    /// yet, but if it does it must be a directory. Neither root may contain
    /// the other.
    pub fn resolve(source: &Path, replica: &Path) -> Result<Self, SyncError> {
        let source = fs::canonicalize(source).map_err(|e| SyncError::InvalidRoot {
            path: source.to_path_buf(),
            reason: format!("source is not accessible: {e}"),
        })?;
        let meta = fs::metadata(&source).map_err(|e| io_err(&source, e))?;
        if !meta.is_dir() {
            return Err(SyncError::InvalidRoot {
                path: source,
                reason: "source is not a directory".to_string(),
            });
        }
        fs::read_dir(&source).map_err(|e| SyncError::InvalidRoot {
            path: source.clone(),
            reason: format!("source cannot be listed: {e}"),
        })?;

        let replica = absolutize(replica).map_err(|e| io_err(replica, e))?;
        match fs::metadata(&replica) {
            Ok(meta) if !meta.is_dir() => {
                return Err(SyncError::InvalidRoot {
                    path: replica,
                    reason: "replica exists and is not a directory".to_string(),
                });
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(&replica, e)),
        }

        if replica.starts_with(&source) || source.starts_with(&replica) {
            return Err(SyncError::OverlappingRoots {
                source_root: source,
                replica_root: replica,
            });
        }

        Ok(Self { source, replica })
    }

    /// Replica-side path for a path walked under the source root.
    pub fn to_replica(&self, source_path: &Path) -> Result<PathBuf, SyncError> {
        mirrored(&self.source, &self.replica, source_path)
    }

    /// Source-side path for a path walked under the replica root.
    pub fn to_source(&self, replica_path: &Path) -> Result<PathBuf, SyncError> {
        mirrored(&self.replica, &self.source, replica_path)
    }
}

/// Map `path` (under `from_root`) onto `to_root`.
pub fn mirrored(from_root: &Path, to_root: &Path, path: &Path) -> Result<PathBuf, SyncError> {
    let relative = path
        .strip_prefix(from_root)
        .map_err(|_| SyncError::OutsideRoot {
            path: path.to_path_buf(),
            root: from_root.to_path_buf(),
        })?;
    if relative.as_os_str().is_empty() {
        return Ok(to_root.to_path_buf());
    }
    Ok(to_root.join(relative))
}

/// Make `path` absolute, resolving symlinks in the longest existing prefix.
///
/// Unlike [`fs::canonicalize`] this works for paths that do not exist yet.
pub fn absolutize(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut existing = absolute.as_path();
    let mut missing: Vec<OsString> = Vec::new();
    loop {
        match fs::canonicalize(existing) {
            Ok(mut base) => {
                for name in missing.iter().rev() {
                    base.push(name);
                }
                return Ok(base);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let (Some(name), Some(parent)) = (existing.file_name(), existing.parent()) else {
                    return Err(e);
                };
                missing.push(name.to_os_string());
                existing = parent;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn mirrored_maps_nested_paths() {
        let mapped = mirrored(
            Path::new("/data/src"),
            Path::new("/backup/replica"),
            Path::new("/data/src/a/b.txt"),
        )
        .unwrap();
        assert_eq!(mapped, PathBuf::from("/backup/replica/a/b.txt"));
    }

    #[test]
    fn mirrored_root_maps_to_root() {
        let mapped = mirrored(Path::new("/src"), Path::new("/dst"), Path::new("/src")).unwrap();
        assert_eq!(mapped, PathBuf::from("/dst"));
    }

    #[test]
    fn mirrored_does_not_match_sibling_with_shared_prefix() {
        // "/src2/x" textually starts with "/src" but is not inside it.
        let err = mirrored(Path::new("/src"), Path::new("/dst"), Path::new("/src2/x")).unwrap_err();
        assert!(matches!(err, SyncError::OutsideRoot { .. }), "got: {err}");
    }

    #[test]
    fn mirrored_only_replaces_the_leading_root() {
        let mapped = mirrored(
            Path::new("/a"),
            Path::new("/b"),
            Path::new("/a/nested/a/file"),
        )
        .unwrap();
        assert_eq!(mapped, PathBuf::from("/b/nested/a/file"));
    }

    #[test]
    fn absolutize_keeps_missing_tail() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("not").join("there");
        let resolved = absolutize(&target).unwrap();
        let base = fs::canonicalize(tmp.path()).unwrap();
        assert_eq!(resolved, base.join("not").join("there"));
    }

    #[test]
    fn resolve_rejects_missing_source() {
        let tmp = TempDir::new().unwrap();
        let err = Roots::resolve(&tmp.path().join("nope"), &tmp.path().join("replica")).unwrap_err();
        assert!(matches!(err, SyncError::InvalidRoot { .. }), "got: {err}");
    }

    #[test]
    fn resolve_rejects_file_source() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("file");
        fs::write(&file, "x").unwrap();
        let err = Roots::resolve(&file, &tmp.path().join("replica")).unwrap_err();
        assert!(matches!(err, SyncError::InvalidRoot { .. }), "got: {err}");
    }

    #[test]
    fn resolve_rejects_file_replica() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("source");
        let replica = tmp.path().join("replica");
        fs::create_dir(&source).unwrap();
        fs::write(&replica, "x").unwrap();
        let err = Roots::resolve(&source, &replica).unwrap_err();
        assert!(matches!(err, SyncError::InvalidRoot { .. }), "got: {err}");
    }

    #[test]
    fn resolve_rejects_nested_roots() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("source");
        fs::create_dir(&source).unwrap();

        let inside = source.join("replica");
        let err = Roots::resolve(&source, &inside).unwrap_err();
        assert!(matches!(err, SyncError::OverlappingRoots { .. }), "got: {err}");

        let err = Roots::resolve(&source, tmp.path()).unwrap_err();
        assert!(matches!(err, SyncError::OverlappingRoots { .. }), "got: {err}");

        let err = Roots::resolve(&source, &source).unwrap_err();
        assert!(matches!(err, SyncError::OverlappingRoots { .. }), "got: {err}");
    }

    #[test]
    fn resolve_accepts_sibling_with_shared_name_prefix() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("data");
        fs::create_dir(&source).unwrap();
        let replica = tmp.path().join("data-replica");

        let roots = Roots::resolve(&source, &replica).unwrap();
        assert!(roots.source.ends_with("data"));
        assert!(roots.replica.ends_with("data-replica"));
    }
}
