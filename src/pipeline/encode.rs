//! Image encoding: raw image bytes → base64 [`EncodedImage`].
//!
//! Vision backends take images as standard base64 strings inside the JSON
//! body. The bytes are sent as-is; a PNG stays a PNG and a JPEG stays a JPEG.

use crate::client::EncodedImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// Base64-wrap `bytes` for a vision request.
pub fn encode_image(bytes: &[u8], mime_type: &str) -> EncodedImage {
    let data = STANDARD.encode(bytes);
    debug!(raw = bytes.len(), encoded = data.len(), "image encoded");
    EncodedImage {
        data,
        mime_type: mime_type.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_standard_base64() {
        let img = encode_image(b"\x89PNG\r\n", "image/png");
        assert_eq!(img.mime_type, "image/png");
        assert_eq!(STANDARD.decode(&img.data).unwrap(), b"\x89PNG\r\n");
        assert!(!img.data.starts_with("data:"));
    }
}
