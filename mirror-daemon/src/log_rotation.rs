//! Size-based log rotation.
//!
//! Rotated copies use the scheme
//!   mirror.log → mirror.log.1 → mirror.log.2 → … → mirror.log.<max_files>
//!
//! [`RotatingFile`] applies the rotation inline: before a write that would
//! take the live file to `max_bytes`, the file is shifted and reopened.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing_subscriber::fmt::MakeWriter;

/// Rotate `log_path` if its size is at least `max_bytes`.
///
/// Returns `true` if rotation occurred, `false` if the file was under the
/// threshold (or did not exist yet).
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };

    if size < max_bytes {
        return Ok(false);
    }
    rotate(log_path, max_files)?;
    Ok(true)
}

/// Shift `<name>.<n>` → `<name>.<n+1>`, then `<name>` → `<name>.1`.
///
/// The oldest copy (`<name>.<max_files>`) is deleted first. With
/// `max_files == 0` the live file is simply truncated.
pub fn rotate(log_path: &Path, max_files: usize) -> io::Result<()> {
    if max_files == 0 {
        File::create(log_path)?;
        return Ok(());
    }

    let oldest = numbered_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }

    for n in (1..max_files).rev() {
        let src = numbered_path(log_path, n);
        let dst = numbered_path(log_path, n + 1);
        if src.exists() {
            fs::rename(&src, &dst)?;
        }
    }

    if log_path.exists() {
        fs::rename(log_path, numbered_path(log_path, 1))?;
    }
    Ok(())
}

/// Build the path for the `n`-th rotated copy of `base` (e.g. `mirror.log.2`).
pub fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("mirror.log");
    base.with_file_name(format!("{name}.{n}"))
}

// ─── Rotating writer ─────────────────────────────────────────────────────────

struct State {
    path: PathBuf,
    file: File,
    size: u64,
    max_bytes: u64,
    max_files: usize,
}

impl State {
    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        rotate(&self.path, self.max_files)?;
        self.file = open_append(&self.path)?;
        self.size = 0;
        Ok(())
    }
}

/// Append-only log file that rotates itself by size.
///
/// Cheap to clone; all clones share one file handle.
#[derive(Clone)]
pub struct RotatingFile {
    state: Arc<Mutex<State>>,
}

impl RotatingFile {
    /// Open (or create) the live file, rotating it first if a previous run
    /// left it over the limit.
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64, max_files: usize) -> io::Result<Self> {
        let path = path.into();
        rotate_if_needed(&path, max_bytes, max_files)?;
        let file = open_append(&path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            state: Arc::new(Mutex::new(State {
                path,
                file,
                size,
                max_bytes,
                max_files,
            })),
        })
    }

    pub fn path(&self) -> PathBuf {
        self.lock().path.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();
        if state.size > 0 && state.size + buf.len() as u64 >= state.max_bytes {
            state.rotate()?;
        }
        let written = state.file.write(buf)?;
        state.size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock().file.flush()
    }
}

impl<'a> MakeWriter<'a> for RotatingFile {
    type Writer = RotatingFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
