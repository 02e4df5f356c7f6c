//! Artifact source resolution: local-first-then-remote bytes for one key.
//!
//! ```text
//!  storage_key ─┬─► LocalArtifactReader (guarded + verified) ──► bytes
//!               │        │ missing
//!               │        ▼
//!               └─► ObjectFetcher (bucket prefix stripped) ──► verify ──► bytes
//! ```
//!
//! Both sources apply the same declared size / sha256 checks, so bytes that
//! leave this module have passed every check the submission declared.
//! Plain images resolve through [`ArtifactSourceResolver::resolve_image`];
//! the derived PDF cache uses [`ArtifactSourceResolver::acquire`] for the
//! original upload and treats a failed fetch as "no bytes".

use crate::config::VisionConfig;
use crate::error::{FetchFailure, VisionError};
use crate::storage::{strip_bucket_prefix, Integrity, LocalArtifactReader, ObjectFetcher};
use crate::submission::ResolvedSubmission;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of looking for the original bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquisition {
    /// Verified bytes.
    Bytes {
        data: Vec<u8>,
        source: ByteSource,
    },
    /// The remote fetch was attempted and failed.
    FetchFailed(FetchFailure),
    /// No source was configured or none had the object.
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteSource {
    Local,
    Remote,
}

impl ByteSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ByteSource::Local => "local",
            ByteSource::Remote => "remote",
        }
    }
}

/// Local reader plus optional remote fetcher for original uploads.
#[derive(Clone)]
pub struct ArtifactSourceResolver {
    reader: Option<LocalArtifactReader>,
    fetcher: Option<Arc<dyn ObjectFetcher>>,
    bucket: String,
    max_fetch_bytes: u64,
}

impl ArtifactSourceResolver {
    pub fn new(config: &VisionConfig, fetcher: Option<Arc<dyn ObjectFetcher>>) -> Self {
        Self {
            reader: config
                .storage_root
                .as_ref()
                .map(|root| LocalArtifactReader::new(root).with_max_bytes(config.max_local_bytes)),
            fetcher,
            bucket: config.bucket.clone(),
            max_fetch_bytes: config.max_fetch_bytes,
        }
    }

    pub fn reader(&self) -> Option<&LocalArtifactReader> {
        self.reader.as_ref()
    }

    pub fn has_fetcher(&self) -> bool {
        self.fetcher.is_some()
    }

    /// Find the submission's original bytes.
    ///
    /// Errors only on permanent problems: a storage key escaping the root,
    /// or bytes (local or fetched) that contradict the declared size/hash.
    pub async fn acquire(&self, sub: &ResolvedSubmission) -> Result<Acquisition, VisionError> {
        let Some(key) = sub.storage_key.as_deref() else {
            return Ok(Acquisition::Unavailable);
        };
        let integrity = Integrity::new(sub.size_bytes, sub.sha256.as_deref());

        if let Some(reader) = &self.reader {
            if let Some(data) = reader.read_verified(key, &integrity)? {
                info!(action = "read_local", submission_id = %sub.id, bytes = data.len(), "original read");
                return Ok(Acquisition::Bytes {
                    data,
                    source: ByteSource::Local,
                });
            }
        }

        let Some(fetcher) = &self.fetcher else {
            return Ok(Acquisition::Unavailable);
        };
        let object_key = strip_bucket_prefix(key, &self.bucket);
        match fetcher
            .fetch(&sub.id, &self.bucket, object_key, self.max_fetch_bytes)
            .await
        {
            Ok(data) => {
                integrity.verify(&data)?;
                info!(action = "fetch_remote", submission_id = %sub.id, bytes = data.len(), "original fetched");
                Ok(Acquisition::Bytes {
                    data,
                    source: ByteSource::Remote,
                })
            }
            Err(failure) => {
                warn!(
                    action = "remote_fetch_failed",
                    reason = %failure,
                    submission_id = %sub.id,
                    "original fetch failed"
                );
                Ok(Acquisition::FetchFailed(failure))
            }
        }
    }

    /// Bytes of a plain image submission.
    ///
    /// An untrusted host and an oversized object keep their own reasons.
    /// Every other failed fetch, and nothing found at all, is
    /// `image_unavailable`. All of these are transient.
    pub async fn resolve_image(
        &self,
        sub: &ResolvedSubmission,
    ) -> Result<(Vec<u8>, ByteSource), VisionError> {
        match self.acquire(sub).await? {
            Acquisition::Bytes { data, source } => Ok((data, source)),
            Acquisition::FetchFailed(
                failure @ (FetchFailure::UntrustedHost | FetchFailure::SizeExceeded),
            ) => Err(VisionError::from(failure)),
            Acquisition::FetchFailed(_) | Acquisition::Unavailable => {
                warn!(action = "image_unavailable", submission_id = %sub.id, "no image bytes");
                Err(VisionError::ImageUnavailable)
            }
        }
    }
}
