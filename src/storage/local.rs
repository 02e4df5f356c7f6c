//! Integrity-checked reads from the sandboxed storage root.

use crate::config::DEFAULT_MAX_LOCAL_BYTES;
use crate::error::VisionError;
use crate::security::guard_path;
use crate::storage::integrity::{Integrity, HASH_CHUNK_BYTES};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Reader bound to one sandbox root.
#[derive(Debug, Clone)]
pub struct LocalArtifactReader {
    root: PathBuf,
    max_bytes: u64,
}

impl LocalArtifactReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_bytes: DEFAULT_MAX_LOCAL_BYTES,
        }
    }

    /// Files larger than `max_bytes` are treated as absent.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read `key` after guarding the path and verifying the declared facts.
    ///
    /// * missing file, or one over the byte cap ⇒ `Ok(None)` (callers fall
    ///   through to remote fetch)
    /// * declared size differs ⇒ [`VisionError::SizeMismatch`]
    /// * declared 64-hex sha256 differs ⇒ [`VisionError::HashMismatch`]
    ///
    /// No bytes are returned unless every supplied check passed.
    pub fn read(
        &self,
        key: &str,
        expected_size: Option<u64>,
        expected_sha256: Option<&str>,
    ) -> Result<Option<Vec<u8>>, VisionError> {
        self.read_verified(key, &Integrity::new(expected_size, expected_sha256))
    }

    /// [`read`](Self::read) with the facts already bundled.
    pub fn read_verified(
        &self,
        key: &str,
        integrity: &Integrity,
    ) -> Result<Option<Vec<u8>>, VisionError> {
        let path = guard_path(&self.root, key)?;
        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(_) => return Ok(None),
        };
        let declared_len = match file.metadata() {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => return Ok(None),
        };
        integrity.check_len(declared_len)?;
        if declared_len > self.max_bytes {
            warn!(action = "local_too_large", bytes = declared_len, limit = self.max_bytes, "local file over cap");
            return Ok(None);
        }

        let (bytes, digest) = match read_hashing(&mut file, declared_len, self.max_bytes) {
            Ok(Some(read)) => read,
            Ok(None) => {
                warn!(action = "local_too_large", limit = self.max_bytes, "local file grew past cap");
                return Ok(None);
            }
            Err(e) => {
                debug!(error_kind = ?e.kind(), "local read interrupted");
                return Ok(None);
            }
        };
        integrity.check_len(bytes.len() as u64)?;
        integrity.check_digest(&digest)?;
        Ok(Some(bytes))
    }
}

/// Read a regular file inside an already-guarded directory.
///
/// Symlinks are never followed, so a link planted next to derived artifacts
/// cannot pull bytes from outside the root. Missing, empty, oversized and
/// unreadable files are all `None`.
pub fn read_file_optional(path: &Path, max_bytes: u64) -> Option<Vec<u8>> {
    let meta = std::fs::symlink_metadata(path).ok()?;
    if !meta.file_type().is_file() || meta.len() == 0 {
        return None;
    }
    if meta.len() > max_bytes {
        warn!(action = "local_too_large", bytes = meta.len(), limit = max_bytes, "local file over cap");
        return None;
    }
    let file = File::open(path).ok()?;
    let mut bytes = Vec::with_capacity(meta.len() as usize);
    file.take(max_bytes + 1).read_to_end(&mut bytes).ok()?;
    if bytes.is_empty() || bytes.len() as u64 > max_bytes {
        return None;
    }
    Some(bytes)
}

/// Stream the file in fixed chunks, hashing as we go. `None` once more than
/// `max_bytes` have been read.
fn read_hashing(
    file: &mut File,
    size_hint: u64,
    max_bytes: u64,
) -> io::Result<Option<(Vec<u8>, String)>> {
    let mut hasher = Sha256::new();
    let mut bytes = Vec::with_capacity(size_hint.min(max_bytes) as usize);
    let mut chunk = vec![0u8; HASH_CHUNK_BYTES];
    loop {
        let n = file.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        if (bytes.len() + n) as u64 > max_bytes {
            return Ok(None);
        }
        hasher.update(&chunk[..n]);
        bytes.extend_from_slice(&chunk[..n]);
    }
    Ok(Some((bytes, format!("{:x}", hasher.finalize()))))
}
