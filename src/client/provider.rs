//! Adapter from any `edgequake_llm` chat provider to [`VisionClient`].

use super::{ClientCapabilities, ClientError, GenerateRequest, GenerateResponse, VisionClient};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Vision client backed by a chat-completion provider (OpenAI, Anthropic,
/// Gemini, ...).
///
/// The provider is already bound to a model, so `GenerateRequest::model` is
/// informational here.
#[derive(Clone)]
pub struct LlmProviderClient {
    provider: Arc<dyn LLMProvider>,
    capabilities: ClientCapabilities,
    max_tokens: usize,
}

impl fmt::Debug for LlmProviderClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmProviderClient")
            .field("provider", &"<dyn LLMProvider>")
            .field("capabilities", &self.capabilities)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl LlmProviderClient {
    /// Wrap a provider. `images` declares whether the model is multimodal.
    pub fn new(provider: Arc<dyn LLMProvider>, images: bool) -> Self {
        Self {
            provider,
            capabilities: ClientCapabilities {
                images,
                extra_args: false,
            },
            max_tokens: 4096,
        }
    }

    /// Build through `ProviderFactory` (`"openai"`, `"anthropic"`, ...).
    pub fn from_factory(provider_name: &str, model: &str) -> Result<Self, ClientError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model)
            .map_err(|e| ClientError::Unavailable(e.to_string()))?;
        Ok(Self::new(provider, true))
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens.max(1);
        self
    }
}

#[async_trait]
impl VisionClient for LlmProviderClient {
    fn capabilities(&self) -> ClientCapabilities {
        self.capabilities
    }

    fn backend_name(&self) -> &str {
        "edgequake_llm"
    }

    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, ClientError> {
        let images: Vec<ImageData> = request
            .images
            .unwrap_or_default()
            .into_iter()
            .map(|image| ImageData::new(image.data, image.mime_type.as_str()).with_detail("high"))
            .collect();
        let messages = vec![ChatMessage::user_with_images(
            request.prompt.as_str(),
            images,
        )];
        let options = CompletionOptions {
            temperature: Some(request.options.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ClientError::Failed(e.to_string()))?;
        debug!(
            input_tokens = response.prompt_tokens,
            output_tokens = response.completion_tokens,
            "provider replied"
        );
        Ok(GenerateResponse {
            text: response.content,
        })
    }
}
