//! Error types for the submission-vision library.
//!
//! Every failure that can leave [`crate::VisionPipeline::extract`] is a
//! [`VisionError`]. Each variant carries exactly one short reason token and
//! belongs to one of two classes:
//!
//! * **Permanent**: the submission itself is unusable (unsupported type,
//!   a storage key escaping the sandbox, bytes that do not match their
//!   declared size or hash). Retrying cannot change the outcome.
//!
//! * **Transient**: the bytes or the model could not be reached *right now*
//!   (storage unreachable, fetch refused, PDF not yet derivable, model
//!   timeout). The enclosing job system retries these with backoff.
//!
//! `Display` of a [`VisionError`] is the bare reason token, so it is safe to
//! surface in an API field or a job record: no path, URL or upstream message
//! ever reaches it.
//!
//! Lower layers have their own error enums ([`FetchFailure`],
//! [`ConfigError`], plus `ClientError`, `RenderError` and `StitchError` next
//! to the collaborators that raise them). Only the pipeline decides how those
//! become a [`VisionError`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Retry class of a [`VisionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureClass {
    /// Worth retrying later.
    Transient,
    /// Final; the submission should be marked as unprocessable.
    Permanent,
}

/// All failures returned by the vision pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum VisionError {
    // ── Permanent ─────────────────────────────────────────────────────────
    /// The submission's mime type is not an image/PDF type we can send.
    #[error("unsupported_mime")]
    UnsupportedMime,

    /// A storage key resolves outside the sandbox root.
    #[error("path_escape")]
    PathEscape,

    /// A storage key (or the sandbox root itself) cannot be resolved.
    #[error("path_error")]
    PathError,

    /// Bytes on hand do not match the declared size.
    #[error("size_mismatch")]
    SizeMismatch,

    /// Bytes on hand do not match the declared sha256.
    #[error("hash_mismatch")]
    HashMismatch,

    // ── Transient: byte acquisition ───────────────────────────────────────
    /// The object-storage URL failed host validation; nothing was sent.
    #[error("untrusted_host")]
    UntrustedHost,

    /// Remote fetch failed (redirect, HTTP error, transport error, ...).
    #[error("remote_fetch_failed")]
    RemoteFetchFailed,

    /// Remote object is larger than the configured byte cap.
    #[error("remote_fetch_too_large")]
    RemoteFetchTooLarge,

    /// Neither local storage nor remote fetch produced the image bytes.
    #[error("image_unavailable")]
    ImageUnavailable,

    /// No derived composite could be produced for a PDF submission.
    #[error("pdf_images_unavailable")]
    PdfImagesUnavailable,

    // ── Transient: model ──────────────────────────────────────────────────
    /// The model answered, but with no text.
    #[error("empty_response")]
    EmptyResponse,

    /// The vision backend could not be reached.
    #[error("client_unavailable")]
    ClientUnavailable,

    /// The vision call exceeded the configured timeout.
    #[error("model_timeout")]
    ModelTimeout,

    /// The vision backend returned an error.
    #[error("model_call_failed")]
    ModelCallFailed,

    // ── Transient: host ───────────────────────────────────────────────────
    /// `extract_sync` could not start its private Tokio runtime.
    #[error("runtime_unavailable")]
    RuntimeUnavailable,
}

impl VisionError {
    /// Retry class of this failure.
    pub fn class(&self) -> FailureClass {
        match self {
            VisionError::UnsupportedMime
            | VisionError::PathEscape
            | VisionError::PathError
            | VisionError::SizeMismatch
            | VisionError::HashMismatch => FailureClass::Permanent,
            _ => FailureClass::Transient,
        }
    }

    /// `true` for transient failures.
    pub fn is_retryable(&self) -> bool {
        self.class() == FailureClass::Transient
    }

    /// The short reason token (identical to `Display`).
    pub fn reason(&self) -> &'static str {
        match self {
            VisionError::UnsupportedMime => "unsupported_mime",
            VisionError::PathEscape => "path_escape",
            VisionError::PathError => "path_error",
            VisionError::SizeMismatch => "size_mismatch",
            VisionError::HashMismatch => "hash_mismatch",
            VisionError::UntrustedHost => "untrusted_host",
            VisionError::RemoteFetchFailed => "remote_fetch_failed",
            VisionError::RemoteFetchTooLarge => "remote_fetch_too_large",
            VisionError::ImageUnavailable => "image_unavailable",
            VisionError::PdfImagesUnavailable => "pdf_images_unavailable",
            VisionError::EmptyResponse => "empty_response",
            VisionError::ClientUnavailable => "client_unavailable",
            VisionError::ModelTimeout => "model_timeout",
            VisionError::ModelCallFailed => "model_call_failed",
            VisionError::RuntimeUnavailable => "runtime_unavailable",
        }
    }
}

impl From<FetchFailure> for VisionError {
    fn from(failure: FetchFailure) -> Self {
        match failure {
            FetchFailure::UntrustedHost => VisionError::UntrustedHost,
            FetchFailure::SizeExceeded => VisionError::RemoteFetchTooLarge,
            _ => VisionError::RemoteFetchFailed,
        }
    }
}

/// Why a remote object fetch produced no bytes.
///
/// `Display` yields the token that is logged as `reason=...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum FetchFailure {
    /// Target URL failed scheme/host validation; no request was made.
    #[error("untrusted_host")]
    UntrustedHost,

    /// The storage key contains segments that cannot be placed in a URL path.
    #[error("invalid_key")]
    InvalidKey,

    /// The server answered with a redirect. Redirects are never followed.
    #[error("redirect:{0}")]
    Redirect(u16),

    /// Declared or streamed size went over the byte cap.
    #[error("size_exceeded")]
    SizeExceeded,

    /// The server answered with a 4xx/5xx status.
    #[error("http_error:{0}")]
    HttpError(u16),

    /// Connect, TLS, timeout or mid-body transport failure.
    #[error("download_error")]
    DownloadError,

    /// A 2xx answer with an empty body.
    #[error("empty_body")]
    Empty,
}

/// Configuration could not be built.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// An environment variable holds a value of the wrong shape.
    #[error("Environment variable {name} has an invalid value {value:?}: expected {expected}")]
    InvalidEnv {
        name: &'static str,
        value: String,
        expected: &'static str,
    },

    /// The HTTP client could not be initialised (TLS backend, ...).
    #[error("Failed to initialise HTTP client: {0}")]
    HttpClient(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_the_reason_token() {
        for e in [
            VisionError::UnsupportedMime,
            VisionError::PathEscape,
            VisionError::HashMismatch,
            VisionError::RemoteFetchTooLarge,
            VisionError::PdfImagesUnavailable,
            VisionError::ModelTimeout,
        ] {
            assert_eq!(e.to_string(), e.reason());
        }
    }

    #[test]
    fn integrity_and_security_failures_are_permanent() {
        assert_eq!(VisionError::UnsupportedMime.class(), FailureClass::Permanent);
        assert_eq!(VisionError::PathEscape.class(), FailureClass::Permanent);
        assert_eq!(VisionError::PathError.class(), FailureClass::Permanent);
        assert_eq!(VisionError::SizeMismatch.class(), FailureClass::Permanent);
        assert!(!VisionError::HashMismatch.is_retryable());
    }

    #[test]
    fn acquisition_and_model_failures_are_transient() {
        for e in [
            VisionError::UntrustedHost,
            VisionError::RemoteFetchFailed,
            VisionError::ImageUnavailable,
            VisionError::PdfImagesUnavailable,
            VisionError::EmptyResponse,
            VisionError::ClientUnavailable,
            VisionError::ModelCallFailed,
        ] {
            assert!(e.is_retryable(), "{e} should be transient");
        }
    }

    #[test]
    fn fetch_failure_tokens() {
        assert_eq!(FetchFailure::Redirect(302).to_string(), "redirect:302");
        assert_eq!(FetchFailure::HttpError(404).to_string(), "http_error:404");
        assert_eq!(FetchFailure::SizeExceeded.to_string(), "size_exceeded");
    }

    #[test]
    fn fetch_failure_mapping() {
        assert_eq!(
            VisionError::from(FetchFailure::UntrustedHost),
            VisionError::UntrustedHost
        );
        assert_eq!(
            VisionError::from(FetchFailure::SizeExceeded),
            VisionError::RemoteFetchTooLarge
        );
        assert_eq!(
            VisionError::from(FetchFailure::Redirect(307)),
            VisionError::RemoteFetchFailed
        );
        assert_eq!(
            VisionError::from(FetchFailure::Empty),
            VisionError::RemoteFetchFailed
        );
    }

    #[test]
    fn failure_class_serialises_lowercase() {
        let json = serde_json::to_string(&FailureClass::Transient).unwrap();
        assert_eq!(json, "\"transient\"");
    }
}
