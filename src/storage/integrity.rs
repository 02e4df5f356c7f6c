//! Declared size / sha256 checks shared by local and remote byte sources.

use crate::error::VisionError;
use sha2::{Digest, Sha256};

/// Size of each chunk fed to the hasher when streaming a file.
pub const HASH_CHUNK_BYTES: usize = 64 * 1024;

/// The integrity facts a submission declares about its original upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Integrity {
    pub size_bytes: Option<u64>,
    /// Only honoured when it is exactly 64 hex digits.
    pub sha256: Option<String>,
}

impl Integrity {
    pub fn new(size_bytes: Option<u64>, sha256: Option<&str>) -> Self {
        Self {
            size_bytes,
            sha256: sha256.map(str::to_string),
        }
    }

    /// The declared hash, lower-cased, if it is a well-formed sha256.
    pub fn expected_digest(&self) -> Option<String> {
        self.sha256
            .as_deref()
            .map(str::trim)
            .filter(|h| is_sha256_hex(h))
            .map(str::to_ascii_lowercase)
    }

    /// Compare a byte count against the declared size.
    pub fn check_len(&self, len: u64) -> Result<(), VisionError> {
        match self.size_bytes {
            Some(expected) if expected != len => Err(VisionError::SizeMismatch),
            _ => Ok(()),
        }
    }

    /// Compare a computed lower-case hex digest against the declared hash.
    pub fn check_digest(&self, actual_hex: &str) -> Result<(), VisionError> {
        match self.expected_digest() {
            Some(expected) if !expected.eq_ignore_ascii_case(actual_hex) => {
                Err(VisionError::HashMismatch)
            }
            _ => Ok(()),
        }
    }

    /// Run every declared check over an in-memory buffer.
    pub fn verify(&self, bytes: &[u8]) -> Result<(), VisionError> {
        self.check_len(bytes.len() as u64)?;
        if self.expected_digest().is_some() {
            let mut hasher = Sha256::new();
            for chunk in bytes.chunks(HASH_CHUNK_BYTES) {
                hasher.update(chunk);
            }
            self.check_digest(&format!("{:x}", hasher.finalize()))?;
        }
        Ok(())
    }
}

/// `true` for exactly 64 ASCII hex digits (either case).
pub fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Lower-case hex sha256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
