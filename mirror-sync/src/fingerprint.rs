//! Content fingerprints — SHA-256 digests used as the change-detection oracle.
//!
//! Files are streamed in [`CHUNK_SIZE`] blocks so large files never have to
//! fit in memory. Nothing is cached between runs.

use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{io_err, SyncError};

/// Read buffer size used while hashing.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// SHA-256 digest of a file's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Compute the fingerprint of the regular file at `path`.
///
/// Fails with [`SyncError::Io`] when the file cannot be opened or read, or
/// when `path` is not a regular file.
pub fn fingerprint(path: &Path) -> Result<Fingerprint, SyncError> {
    let mut file = File::open(path).map_err(|e| io_err(path, e))?;
    let meta = file.metadata().map_err(|e| io_err(path, e))?;
    if !meta.is_file() {
        return Err(io_err(
            path,
            std::io::Error::new(ErrorKind::InvalidInput, "not a regular file"),
        ));
    }

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(io_err(path, e)),
        };
        hasher.update(&buf[..n]);
    }
    Ok(Fingerprint(hasher.finalize().into()))
}

/// Decide whether `source` and `replica` hold different bytes.
///
/// A size mismatch short-circuits; equal sizes fall back to fingerprints.
pub fn files_differ(source: &Path, replica: &Path) -> Result<bool, SyncError> {
    let source_len = std::fs::metadata(source)
        .map_err(|e| io_err(source, e))?
        .len();
    let replica_len = std::fs::metadata(replica)
        .map_err(|e| io_err(replica, e))?
        .len();
    if source_len != replica_len {
        return Ok(true);
    }
    Ok(fingerprint(source)? != fingerprint(replica)?)
}
