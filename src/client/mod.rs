//! Vision backends.
//!
//! The pipeline talks to a model through the [`VisionClient`] trait. Backends
//! differ in whether they take images at all, so each one declares its
//! [`ClientCapabilities`] up front and the invocation step shapes the request
//! from that declaration instead of guessing.
//!
//! | Backend | Transport | Images |
//! |---------|-----------|--------|
//! | [`OllamaClient`] | native `/api/generate` via reqwest | yes |
//! | [`LlmProviderClient`] | any `edgequake_llm::LLMProvider` chat call | configurable |

mod ollama;
mod provider;

pub use ollama::OllamaClient;
pub use provider::LlmProviderClient;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// What a backend accepts besides the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientCapabilities {
    /// The backend reads the `images` field.
    pub images: bool,
    /// The backend tolerates extra request fields it may not use.
    pub extra_args: bool,
}

impl ClientCapabilities {
    pub const TEXT_ONLY: Self = Self {
        images: false,
        extra_args: false,
    };

    pub const WITH_IMAGES: Self = Self {
        images: true,
        extra_args: false,
    };

    /// Whether a single plain image may be attached.
    pub fn accepts_images(&self) -> bool {
        self.images || self.extra_args
    }
}

/// One base64-encoded image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodedImage {
    /// Standard base64, no data-URI prefix.
    pub data: String,
    pub mime_type: String,
}

/// Sampling options forwarded to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerateOptions {
    pub temperature: f32,
}

/// A fully shaped generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub options: GenerateOptions,
    /// `None` when the backend gets no images at all.
    pub images: Option<Vec<EncodedImage>>,
}

#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub text: String,
}

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Backend unreachable (connection refused, DNS, ...).
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The backend's own timeout fired.
    #[error("backend timed out")]
    Timeout,

    /// Non-success HTTP status.
    #[error("backend returned HTTP {0}")]
    Http(u16),

    /// Any other backend-reported failure.
    #[error("backend call failed: {0}")]
    Failed(String),
}

/// A vision/OCR model backend.
#[async_trait]
pub trait VisionClient: Send + Sync {
    /// Declared request shape support. Defaults to text only.
    fn capabilities(&self) -> ClientCapabilities {
        ClientCapabilities::TEXT_ONLY
    }

    /// Reported as `backend` in result metadata.
    fn backend_name(&self) -> &str {
        "custom"
    }

    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, ClientError>;
}
