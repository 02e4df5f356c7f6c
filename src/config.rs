//! Configuration for the vision pipeline.
//!
//! Every knob lives in one immutable [`VisionConfig`], built via
//! [`VisionConfigBuilder`] or read from the process environment with
//! [`VisionConfig::from_env`]. The pipeline receives it once at construction
//! and never reads the environment again.

use crate::error::ConfigError;
use std::fmt;
use std::path::PathBuf;
use url::Url;

/// Bucket used when `LEARNING_STORAGE_BUCKET` is unset.
pub const DEFAULT_BUCKET: &str = "submissions";
/// Model used when `AI_VISION_MODEL` is unset.
pub const DEFAULT_VISION_MODEL: &str = "qwen2.5-vl:7b";
/// Ollama endpoint used when `OLLAMA_BASE_URL` is unset.
pub const DEFAULT_MODEL_ENDPOINT: &str = "http://ollama:11434";
/// Remote fetch byte cap when `LEARNING_MAX_UPLOAD_BYTES` is unset (10 MiB).
pub const DEFAULT_MAX_FETCH_BYTES: u64 = 10 * 1024 * 1024;
/// Cap on any single file read from the storage root (64 MiB).
pub const DEFAULT_MAX_LOCAL_BYTES: u64 = 64 * 1024 * 1024;

/// Configuration for [`crate::VisionPipeline`].
///
/// # Example
/// ```rust
/// use submission_vision::VisionConfig;
///
/// let config = VisionConfig::builder()
///     .storage_root("/srv/storage")
///     .model("qwen2.5-vl:7b")
///     .vision_timeout_secs(45)
///     .build()
///     .unwrap();
/// assert!(!config.remote_enabled());
/// ```
#[derive(Clone)]
pub struct VisionConfig {
    /// Sandbox root for local reads and derived artifacts. `None` disables
    /// every local tier.
    pub storage_root: Option<PathBuf>,

    /// Object-storage base URL. Remote fetch is only attempted when this and
    /// [`service_key`](Self::service_key) are both set.
    pub storage_url: Option<String>,

    /// Optional public base URL of the same storage; its host joins the
    /// allow-set.
    pub public_storage_url: Option<String>,

    /// Service credential sent as `apikey` and bearer token. Never logged.
    pub service_key: Option<String>,

    /// Storage bucket. Default: `submissions`.
    pub bucket: String,

    /// Host suffixes treated as local for plain-http storage. Default: `.local`.
    pub local_host_suffixes: Vec<String>,

    /// Hard cap on remotely fetched bytes. Default: 10 MiB.
    pub max_fetch_bytes: u64,

    /// Cap on one local file read: originals, page images and cached
    /// composites. Larger files are treated as absent. Default: 64 MiB.
    pub max_local_bytes: u64,

    /// Remote fetch timeout in seconds. Default: 10.
    pub fetch_timeout_secs: u64,

    /// Vision model identifier. Default: `qwen2.5-vl:7b`.
    pub model: String,

    /// Base URL of the native Ollama API. Default: `http://ollama:11434`.
    pub model_endpoint: String,

    /// Upper bound for one vision call in seconds. Range 1–300. Default: 30.
    pub vision_timeout_secs: u64,

    /// Sampling temperature. Default: 0.0 (transcription should be literal).
    pub temperature: f32,

    /// Rendering DPI for scanned PDFs. Range: 72–400. Default: 150.
    pub render_dpi: u32,

    /// Per-edge pixel cap for rendered pages. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Maximum number of PDF pages rendered. Default: 20.
    pub render_page_limit: usize,

    /// Render pages in grayscale. Default: true.
    pub grayscale: bool,

    /// Explicit pdfium shared library. `None` binds the system library.
    pub pdfium_library_path: Option<PathBuf>,

    /// Bounds for the legacy derived-directory search.
    pub legacy_scan: LegacyScanLimits,
}

/// Caps for the recursive `**/derived/<submission_id>` search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyScanLimits {
    /// Maximum directory depth below the storage root.
    pub max_depth: usize,
    /// Maximum directory entries inspected before giving up.
    pub max_entries: usize,
    /// Maximum matching directories returned.
    pub max_matches: usize,
}

impl Default for LegacyScanLimits {
    fn default() -> Self {
        Self {
            max_depth: 8,
            max_entries: 20_000,
            max_matches: 4,
        }
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            storage_root: None,
            storage_url: None,
            public_storage_url: None,
            service_key: None,
            bucket: DEFAULT_BUCKET.to_string(),
            local_host_suffixes: vec![".local".to_string()],
            max_fetch_bytes: DEFAULT_MAX_FETCH_BYTES,
            max_local_bytes: DEFAULT_MAX_LOCAL_BYTES,
            fetch_timeout_secs: 10,
            model: DEFAULT_VISION_MODEL.to_string(),
            model_endpoint: DEFAULT_MODEL_ENDPOINT.to_string(),
            vision_timeout_secs: 30,
            temperature: 0.0,
            render_dpi: 150,
            max_rendered_pixels: 2000,
            render_page_limit: 20,
            grayscale: true,
            pdfium_library_path: None,
            legacy_scan: LegacyScanLimits::default(),
        }
    }
}

impl fmt::Debug for VisionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisionConfig")
            .field("storage_root", &self.storage_root)
            .field("storage_url", &self.storage_url)
            .field("public_storage_url", &self.public_storage_url)
            .field("service_key", &self.service_key.as_ref().map(|_| "<redacted>"))
            .field("bucket", &self.bucket)
            .field("local_host_suffixes", &self.local_host_suffixes)
            .field("max_fetch_bytes", &self.max_fetch_bytes)
            .field("max_local_bytes", &self.max_local_bytes)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("model", &self.model)
            .field("model_endpoint", &self.model_endpoint)
            .field("vision_timeout_secs", &self.vision_timeout_secs)
            .field("render_dpi", &self.render_dpi)
            .field("render_page_limit", &self.render_page_limit)
            .field("grayscale", &self.grayscale)
            .finish()
    }
}

impl VisionConfig {
    /// Create a new builder seeded with defaults.
    pub fn builder() -> VisionConfigBuilder {
        VisionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Turn an existing config back into a builder (CLI overrides).
    pub fn into_builder(self) -> VisionConfigBuilder {
        VisionConfigBuilder { config: self }
    }

    /// `true` when both a storage URL and a service credential are configured.
    pub fn remote_enabled(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        filled(&self.storage_url) && filled(&self.service_key)
    }

    /// Read the configuration from the process environment.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `STORAGE_VERIFY_ROOT` | `storage_root` |
    /// | `SUPABASE_URL` / `SUPABASE_PUBLIC_URL` | `storage_url` / `public_storage_url` |
    /// | `SUPABASE_SERVICE_ROLE_KEY` | `service_key` |
    /// | `LEARNING_STORAGE_BUCKET` | `bucket` |
    /// | `LEARNING_MAX_UPLOAD_BYTES` | `max_fetch_bytes` |
    /// | `AI_VISION_MODEL` | `model` |
    /// | `OLLAMA_BASE_URL` | `model_endpoint` |
    /// | `AI_TIMEOUT_VISION` | `vision_timeout_secs` |
    /// | `STORAGE_LOCAL_HOST_SUFFIXES` | `local_host_suffixes` (comma list) |
    /// | `PDFIUM_LIB_PATH` | `pdfium_library_path` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut builder = Self::builder();
        if let Some(root) = get("STORAGE_VERIFY_ROOT") {
            builder = builder.storage_root(root);
        }
        if let Some(url) = get("SUPABASE_URL") {
            builder = builder.storage_url(url);
        }
        if let Some(url) = get("SUPABASE_PUBLIC_URL") {
            builder = builder.public_storage_url(url);
        }
        if let Some(key) = get("SUPABASE_SERVICE_ROLE_KEY") {
            builder = builder.service_key(key);
        }
        if let Some(bucket) = get("LEARNING_STORAGE_BUCKET") {
            builder = builder.bucket(bucket);
        }
        if let Some(raw) = get("LEARNING_MAX_UPLOAD_BYTES") {
            builder = builder.max_fetch_bytes(parse_u64("LEARNING_MAX_UPLOAD_BYTES", &raw)?);
        }
        if let Some(model) = get("AI_VISION_MODEL") {
            builder = builder.model(model);
        }
        if let Some(endpoint) = get("OLLAMA_BASE_URL") {
            builder = builder.model_endpoint(endpoint);
        }
        if let Some(raw) = get("AI_TIMEOUT_VISION") {
            let secs = parse_u64("AI_TIMEOUT_VISION", &raw)?;
            if !(1..=300).contains(&secs) {
                return Err(ConfigError::InvalidEnv {
                    name: "AI_TIMEOUT_VISION",
                    value: raw,
                    expected: "an integer between 1 and 300",
                });
            }
            builder = builder.vision_timeout_secs(secs);
        }
        if let Some(raw) = get("STORAGE_LOCAL_HOST_SUFFIXES") {
            builder = builder.local_host_suffixes(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            );
        }
        if let Some(path) = get("PDFIUM_LIB_PATH") {
            builder = builder.pdfium_library_path(path);
        }
        builder.build()
    }
}

fn parse_u64(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.parse::<u64>().map_err(|_| ConfigError::InvalidEnv {
        name,
        value: raw.to_string(),
        expected: "a non-negative integer",
    })
}

/// Builder for [`VisionConfig`].
#[derive(Debug)]
pub struct VisionConfigBuilder {
    config: VisionConfig,
}

impl VisionConfigBuilder {
    pub fn storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.storage_root = Some(root.into());
        self
    }

    pub fn storage_url(mut self, url: impl Into<String>) -> Self {
        self.config.storage_url = Some(url.into());
        self
    }

    pub fn public_storage_url(mut self, url: impl Into<String>) -> Self {
        self.config.public_storage_url = Some(url.into());
        self
    }

    pub fn service_key(mut self, key: impl Into<String>) -> Self {
        self.config.service_key = Some(key.into());
        self
    }

    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.bucket = bucket.into();
        self
    }

    pub fn local_host_suffixes(mut self, suffixes: Vec<String>) -> Self {
        self.config.local_host_suffixes = suffixes;
        self
    }

    pub fn max_fetch_bytes(mut self, bytes: u64) -> Self {
        self.config.max_fetch_bytes = bytes;
        self
    }

    pub fn max_local_bytes(mut self, bytes: u64) -> Self {
        self.config.max_local_bytes = bytes;
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn model_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.model_endpoint = endpoint.into();
        self
    }

    pub fn vision_timeout_secs(mut self, secs: u64) -> Self {
        self.config.vision_timeout_secs = secs.clamp(1, 300);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn render_dpi(mut self, dpi: u32) -> Self {
        self.config.render_dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn render_page_limit(mut self, pages: usize) -> Self {
        self.config.render_page_limit = pages.max(1);
        self
    }

    pub fn grayscale(mut self, v: bool) -> Self {
        self.config.grayscale = v;
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn legacy_scan(mut self, limits: LegacyScanLimits) -> Self {
        self.config.legacy_scan = limits;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<VisionConfig, ConfigError> {
        let c = &self.config;
        if c.bucket.trim().is_empty() || c.bucket.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "bucket must be a single non-empty path segment, got {:?}",
                c.bucket
            )));
        }
        if c.max_fetch_bytes == 0 {
            return Err(ConfigError::Invalid("max_fetch_bytes must be ≥ 1".into()));
        }
        if c.max_local_bytes == 0 {
            return Err(ConfigError::Invalid("max_local_bytes must be ≥ 1".into()));
        }
        if c.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model must not be empty".into()));
        }
        match Url::parse(&c.model_endpoint) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "model_endpoint must be an http(s) URL, got {:?}",
                    c.model_endpoint
                )))
            }
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let c = VisionConfig::default();
        assert_eq!(c.bucket, "submissions");
        assert_eq!(c.max_fetch_bytes, 10 * 1024 * 1024);
        assert_eq!(c.max_local_bytes, 64 * 1024 * 1024);
        assert_eq!(c.vision_timeout_secs, 30);
        assert_eq!(c.render_page_limit, 20);
        assert!(c.grayscale);
        assert_eq!(c.legacy_scan.max_depth, 8);
        assert!(!c.remote_enabled());
    }

    #[test]
    fn builder_clamps() {
        let c = VisionConfig::builder()
            .vision_timeout_secs(900)
            .render_dpi(10)
            .temperature(5.0)
            .build()
            .unwrap();
        assert_eq!(c.vision_timeout_secs, 300);
        assert_eq!(c.render_dpi, 72);
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn builder_rejects_bad_endpoint() {
        let err = VisionConfig::builder()
            .model_endpoint("ftp://ollama:11434")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("model_endpoint"));
    }

    #[test]
    fn builder_rejects_nested_bucket() {
        assert!(VisionConfig::builder().bucket("a/b").build().is_err());
        assert!(VisionConfig::builder().bucket("  ").build().is_err());
    }

    #[test]
    fn remote_needs_url_and_key() {
        let only_url = VisionConfig::builder()
            .storage_url("http://storage.local:8000")
            .build()
            .unwrap();
        assert!(!only_url.remote_enabled());

        let both = only_url.into_builder().service_key("srk").build().unwrap();
        assert!(both.remote_enabled());
    }

    #[test]
    fn debug_redacts_service_key() {
        let c = VisionConfig::builder()
            .service_key("super-secret-key")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("super-secret-key"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn from_lookup_reads_variables() {
        let c = VisionConfig::from_lookup(lookup(&[
            ("STORAGE_VERIFY_ROOT", "/srv/storage"),
            ("SUPABASE_URL", "http://supabase.local:54321"),
            ("SUPABASE_SERVICE_ROLE_KEY", "srk"),
            ("LEARNING_STORAGE_BUCKET", "uploads"),
            ("LEARNING_MAX_UPLOAD_BYTES", "2048"),
            ("AI_VISION_MODEL", "llava:13b"),
            ("AI_TIMEOUT_VISION", "45"),
            ("STORAGE_LOCAL_HOST_SUFFIXES", ".lan, .internal ,"),
        ]))
        .unwrap();
        assert_eq!(c.storage_root, Some(PathBuf::from("/srv/storage")));
        assert!(c.remote_enabled());
        assert_eq!(c.bucket, "uploads");
        assert_eq!(c.max_fetch_bytes, 2048);
        assert_eq!(c.model, "llava:13b");
        assert_eq!(c.vision_timeout_secs, 45);
        assert_eq!(c.local_host_suffixes, vec![".lan", ".internal"]);
    }

    #[test]
    fn from_lookup_blank_values_use_defaults() {
        let c = VisionConfig::from_lookup(lookup(&[("AI_VISION_MODEL", "   ")])).unwrap();
        assert_eq!(c.model, DEFAULT_VISION_MODEL);
    }

    #[test]
    fn from_lookup_rejects_out_of_range_timeout() {
        let err = VisionConfig::from_lookup(lookup(&[("AI_TIMEOUT_VISION", "0")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                name: "AI_TIMEOUT_VISION",
                ..
            }
        ));
        assert!(VisionConfig::from_lookup(lookup(&[("AI_TIMEOUT_VISION", "abc")])).is_err());
    }
}
