//! Result of a successful extraction.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Adapter name reported in every result's metadata.
pub const ADAPTER_NAME: &str = "local_vision";

/// Markdown text plus a small, path-free metadata map.
///
/// Metadata keys: `adapter`, `model`, `backend` (`pass_through` for text,
/// `ollama`/client name otherwise), and when bytes were read, `bytes_read`
/// and `source` (`local`, `remote`, or the cache tier action for PDFs).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionResult {
    pub text: String,
    pub metadata: Map<String, Value>,
}

impl VisionResult {
    pub(crate) fn new(text: String, adapter: &str, model: &str, backend: &str) -> Self {
        let mut metadata = Map::new();
        metadata.insert("adapter".into(), Value::from(adapter));
        metadata.insert("model".into(), Value::from(model));
        metadata.insert("backend".into(), Value::from(backend));
        Self { text, metadata }
    }

    pub(crate) fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn backend(&self) -> Option<&str> {
        self.metadata.get("backend").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_shape() {
        let r = VisionResult::new("# x".into(), ADAPTER_NAME, "m", "ollama").with_meta("bytes_read", 12u64);
        assert_eq!(r.backend(), Some("ollama"));
        assert_eq!(r.metadata["adapter"], "local_vision");
        assert_eq!(r.metadata["bytes_read"], 12);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["text"], "# x");
    }
}
