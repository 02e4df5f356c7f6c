//! Top-level extraction entry points.
//!
//! [`VisionPipeline::extract`] turns one submission into Markdown:
//!
//! ```text
//! text  ──────────────────────────────────────────────► pass-through
//! image ─► mime check ─► guard ─► ArtifactSourceResolver ─┐
//! pdf   ─► mime check ─► guard ─► DerivedPdfCache ────────┴─► invoke ─► VisionResult
//! ```
//!
//! It is the only place where "could not produce bytes" becomes a terminal
//! [`VisionError`]; every helper below it reports absence as `None`.

use crate::client::{EncodedImage, VisionClient};
use crate::config::VisionConfig;
use crate::error::{ConfigError, VisionError};
use crate::output::{VisionResult, ADAPTER_NAME};
use crate::pipeline::derived::DerivedPdfCache;
use crate::pipeline::encode::encode_image;
use crate::pipeline::invoke::{invoke, Invocation};
use crate::pipeline::render::{PdfRenderer, PdfiumRenderer};
use crate::pipeline::source::ArtifactSourceResolver;
use crate::pipeline::stitch::{PageStitcher, VerticalStitcher};
use crate::prompts::vision_prompt;
use crate::security::guard_path;
use crate::storage::{ObjectFetcher, RemoteObjectFetcher};
use crate::submission::{JobPayload, ResolvedSubmission, SubmissionRef, SupportedMime};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Text returned for a text submission with no content.
pub const EMPTY_SUBMISSION_TEXT: &str = "# (empty submission)";

/// Backend name reported for text pass-through.
const PASS_THROUGH: &str = "pass_through";

/// The assembled pipeline. Cheap to share behind an `Arc`; safe to call
/// concurrently for distinct submissions.
pub struct VisionPipeline {
    config: Arc<VisionConfig>,
    client: Arc<dyn VisionClient>,
    sources: ArtifactSourceResolver,
    derived: DerivedPdfCache,
}

impl fmt::Debug for VisionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisionPipeline")
            .field("config", &self.config)
            .field("client", &self.client.backend_name())
            .field("remote", &self.sources.has_fetcher())
            .finish()
    }
}

impl VisionPipeline {
    /// Start building a pipeline around `client`.
    pub fn builder(config: VisionConfig, client: Arc<dyn VisionClient>) -> VisionPipelineBuilder {
        VisionPipelineBuilder {
            config,
            client,
            fetcher: None,
            renderer: None,
            stitcher: None,
        }
    }

    pub fn config(&self) -> &VisionConfig {
        &self.config
    }

    /// Extract Markdown from one submission.
    ///
    /// # Errors
    /// Permanent: `unsupported_mime`, `path_escape`, `path_error`,
    /// `size_mismatch`, `hash_mismatch`. Everything else is transient.
    pub async fn extract(
        &self,
        submission: &SubmissionRef,
        payload: &JobPayload,
    ) -> Result<VisionResult, VisionError> {
        let sub = ResolvedSubmission::merge(submission, payload);
        let model = self.config.model.as_str();

        if sub.is_text() {
            let text = sub
                .text
                .clone()
                .unwrap_or_else(|| EMPTY_SUBMISSION_TEXT.to_string());
            info!(action = "pass_through", submission_id = %sub.id, chars = text.len(), "text submission");
            return Ok(VisionResult::new(text, ADAPTER_NAME, model, PASS_THROUGH));
        }

        let Some(mime) = SupportedMime::parse(&sub.mime_type) else {
            warn!(action = "unsupported_mime", submission_id = %sub.id, "mime type rejected");
            return Err(VisionError::UnsupportedMime);
        };

        if let (Some(reader), Some(key)) = (self.sources.reader(), sub.storage_key.as_deref()) {
            if let Err(e) = guard_path(reader.root(), key) {
                warn!(action = %e, submission_id = %sub.id, "storage key rejected");
                return Err(e);
            }
        }

        let backend = self.client.backend_name().to_string();
        let (invocation, bytes_read, source) = if mime.is_pdf() {
            let composite = self.derived.ensure_composite(&sub, &self.sources).await?;
            let bytes = composite.png.len();
            let invocation = self.invocation(&sub, mime, None, vec![encode_image(&composite.png, "image/png")]);
            (invocation, bytes, composite.tier.action())
        } else {
            let (bytes, source) = self.sources.resolve_image(&sub).await?;
            let len = bytes.len();
            let invocation = self.invocation(&sub, mime, Some(encode_image(&bytes, mime.as_str())), Vec::new());
            (invocation, len, source.as_str())
        };

        let text = invoke(self.client.as_ref(), invocation).await?;
        if text.trim().is_empty() {
            warn!(action = "empty_response", submission_id = %sub.id, "model returned no text");
            return Err(VisionError::EmptyResponse);
        }

        info!(action = "extracted", submission_id = %sub.id, bytes = bytes_read, chars = text.len(), "vision text ready");
        Ok(VisionResult::new(text, ADAPTER_NAME, model, &backend)
            .with_meta("bytes_read", bytes_read as u64)
            .with_meta("source", source))
    }

    /// Blocking wrapper around [`extract`](Self::extract).
    ///
    /// Creates a temporary Tokio runtime internally; do not call from inside
    /// an async context.
    pub fn extract_sync(
        &self,
        submission: &SubmissionRef,
        payload: &JobPayload,
    ) -> Result<VisionResult, VisionError> {
        tokio::runtime::Runtime::new()
            .map_err(|_| VisionError::RuntimeUnavailable)?
            .block_on(self.extract(submission, payload))
    }

    fn invocation<'a>(
        &'a self,
        sub: &'a ResolvedSubmission,
        mime: SupportedMime,
        single_image: Option<EncodedImage>,
        image_list: Vec<EncodedImage>,
    ) -> Invocation<'a> {
        Invocation {
            submission_id: &sub.id,
            is_pdf: mime.is_pdf(),
            prompt: vision_prompt(sub.kind.as_str(), mime.as_str()),
            model: &self.config.model,
            temperature: self.config.temperature,
            timeout: Duration::from_secs(self.config.vision_timeout_secs),
            single_image,
            image_list,
        }
    }
}

/// Builder for [`VisionPipeline`]. Collaborators left unset get the
/// production defaults.
pub struct VisionPipelineBuilder {
    config: VisionConfig,
    client: Arc<dyn VisionClient>,
    fetcher: Option<Arc<dyn ObjectFetcher>>,
    renderer: Option<Arc<dyn PdfRenderer>>,
    stitcher: Option<Arc<dyn PageStitcher>>,
}

impl VisionPipelineBuilder {
    /// Use `fetcher` instead of the configured [`RemoteObjectFetcher`].
    pub fn fetcher(mut self, fetcher: Arc<dyn ObjectFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn PdfRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn stitcher(mut self, stitcher: Arc<dyn PageStitcher>) -> Self {
        self.stitcher = Some(stitcher);
        self
    }

    pub fn build(self) -> Result<VisionPipeline, ConfigError> {
        let fetcher = match self.fetcher {
            Some(fetcher) => Some(fetcher),
            None => RemoteObjectFetcher::from_config(&self.config)?
                .map(|f| Arc::new(f) as Arc<dyn ObjectFetcher>),
        };
        let renderer = self
            .renderer
            .unwrap_or_else(|| Arc::new(PdfiumRenderer::from_config(&self.config)));
        let stitcher = self
            .stitcher
            .unwrap_or_else(|| Arc::new(VerticalStitcher::default()));

        let sources = ArtifactSourceResolver::new(&self.config, fetcher);
        let derived = DerivedPdfCache::new(&self.config, renderer, stitcher);
        Ok(VisionPipeline {
            config: Arc::new(self.config),
            client: self.client,
            sources,
            derived,
        })
    }
}
