//! Vision invocation: shape the request for the backend and make one call.
//!
//! ## Image argument shape
//!
//! | Input | Backend declares images / extra args | Sent |
//! |-------|--------------------------------------|------|
//! | PDF composite list | (ignored) | `images = list` |
//! | single image | yes | `images = [image]` |
//! | single image | no | no images |
//!
//! PDFs always carry their composite: a text-only call for a scanned PDF
//! would answer from nothing. The call is bounded by `tokio::time::timeout`;
//! every failure here is transient.

use crate::client::{
    ClientCapabilities, ClientError, EncodedImage, GenerateOptions, GenerateRequest, VisionClient,
};
use crate::error::VisionError;
use crate::pipeline::postprocess::unwrap_fenced;
use std::time::Duration;
use tracing::{debug, warn};

/// Everything needed for one vision call.
#[derive(Debug, Clone)]
pub struct Invocation<'a> {
    pub submission_id: &'a str,
    pub is_pdf: bool,
    pub prompt: String,
    pub model: &'a str,
    pub temperature: f32,
    pub timeout: Duration,
    pub single_image: Option<EncodedImage>,
    pub image_list: Vec<EncodedImage>,
}

/// Pick the `images` argument for `caps`.
pub fn select_images(
    caps: ClientCapabilities,
    is_pdf: bool,
    single_image: Option<EncodedImage>,
    image_list: Vec<EncodedImage>,
) -> Option<Vec<EncodedImage>> {
    if is_pdf {
        return Some(image_list);
    }
    match single_image {
        Some(image) if caps.accepts_images() => Some(vec![image]),
        _ => None,
    }
}

/// Call the model once. Returns the answer with any outer fence removed;
/// the caller decides what an empty answer means.
pub async fn invoke(
    client: &dyn VisionClient,
    invocation: Invocation<'_>,
) -> Result<String, VisionError> {
    let submission_id = invocation.submission_id;
    let images = select_images(
        client.capabilities(),
        invocation.is_pdf,
        invocation.single_image,
        invocation.image_list,
    );
    debug!(
        submission_id = %submission_id,
        images = images.as_ref().map_or(0, Vec::len),
        "invoking vision model"
    );

    let request = GenerateRequest {
        model: invocation.model.to_string(),
        prompt: invocation.prompt,
        options: GenerateOptions {
            temperature: invocation.temperature,
        },
        images,
    };

    let outcome = tokio::time::timeout(invocation.timeout, client.generate(request)).await;
    let response = match outcome {
        Err(_) => {
            warn!(action = "model_timeout", submission_id = %submission_id, "vision call timed out");
            return Err(VisionError::ModelTimeout);
        }
        Ok(Err(e)) => {
            let error = classify(&e);
            warn!(action = %error, submission_id = %submission_id, "vision call failed");
            return Err(error);
        }
        Ok(Ok(response)) => response,
    };
    Ok(unwrap_fenced(&response.text))
}

fn classify(error: &ClientError) -> VisionError {
    match error {
        ClientError::Timeout => VisionError::ModelTimeout,
        ClientError::Unavailable(_) => VisionError::ClientUnavailable,
        ClientError::Http(_) | ClientError::Failed(_) => VisionError::ModelCallFailed,
    }
}
