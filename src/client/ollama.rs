//! Native Ollama `/api/generate` backend.

use super::{ClientCapabilities, ClientError, GenerateRequest, GenerateResponse, VisionClient};
use crate::config::VisionConfig;
use crate::error::ConfigError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Client for a local Ollama server. Declares image support.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    endpoint: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaGenerate<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<&'a str>>,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaReply {
    #[serde(default)]
    response: String,
}

impl OllamaClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn from_config(config: &VisionConfig) -> Result<Self, ConfigError> {
        Self::new(
            config.model_endpoint.clone(),
            Duration::from_secs(config.vision_timeout_secs),
        )
    }
}

#[async_trait]
impl VisionClient for OllamaClient {
    fn capabilities(&self) -> ClientCapabilities {
        ClientCapabilities::WITH_IMAGES
    }

    fn backend_name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, ClientError> {
        let body = OllamaGenerate {
            model: &request.model,
            prompt: &request.prompt,
            stream: false,
            options: OllamaOptions {
                temperature: request.options.temperature,
            },
            images: request
                .images
                .as_ref()
                .map(|images| images.iter().map(|i| i.data.as_str()).collect()),
        };

        let response = self
            .http
            .post(format!("{}/api/generate", self.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClientError::Timeout
                } else if e.is_connect() {
                    ClientError::Unavailable(e.to_string())
                } else {
                    ClientError::Failed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Http(status.as_u16()));
        }
        let reply: OllamaReply = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout
            } else {
                ClientError::Failed(e.to_string())
            }
        })?;
        debug!(chars = reply.response.len(), "ollama replied");
        Ok(GenerateResponse {
            text: reply.response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{EncodedImage, GenerateOptions};

    #[test]
    fn request_body_shape() {
        let req = GenerateRequest {
            model: "qwen2.5-vl:7b".into(),
            prompt: "read".into(),
            options: GenerateOptions { temperature: 0.0 },
            images: Some(vec![EncodedImage {
                data: "AAAA".into(),
                mime_type: "image/png".into(),
            }]),
        };
        let body = OllamaGenerate {
            model: &req.model,
            prompt: &req.prompt,
            stream: false,
            options: OllamaOptions { temperature: 0.0 },
            images: req
                .images
                .as_ref()
                .map(|images| images.iter().map(|i| i.data.as_str()).collect()),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["images"][0], "AAAA");
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["temperature"], 0.0);
    }

    #[test]
    fn images_omitted_when_absent() {
        let body = OllamaGenerate {
            model: "m",
            prompt: "p",
            stream: false,
            options: OllamaOptions { temperature: 0.0 },
            images: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("images").is_none());
    }

    #[test]
    fn endpoint_trailing_slash_trimmed() {
        let c = OllamaClient::new("http://ollama:11434/", Duration::from_secs(1)).unwrap();
        assert_eq!(c.endpoint, "http://ollama:11434");
        assert!(c.capabilities().images);
    }
}
