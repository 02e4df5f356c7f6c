//! SSRF-guarded object-storage fetch.
//!
//! ## Request shape
//!
//! ```text
//! GET {base}/storage/v1/object/{bucket}/{key}
//! apikey: <service key>
//! Authorization: Bearer <service key>
//! ```
//!
//! The URL is built from the single configured base and checked against
//! [`TrustedHosts`] before any socket is opened. Redirects are never followed:
//! a 3xx is a failure (`redirect:<code>`). The body is streamed and abandoned
//! as soon as the running count passes the byte cap, so an oversized object
//! never sits in memory.

use crate::config::VisionConfig;
use crate::error::{ConfigError, FetchFailure};
use crate::security::TrustedHosts;
use async_trait::async_trait;
use reqwest::{redirect, StatusCode};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Source of original objects that are not available locally.
#[async_trait]
pub trait ObjectFetcher: Send + Sync {
    /// Fetch `key` from `bucket`, refusing anything above `max_bytes`.
    async fn fetch(
        &self,
        submission_id: &str,
        bucket: &str,
        key: &str,
        max_bytes: u64,
    ) -> Result<Vec<u8>, FetchFailure>;
}

/// HTTP fetcher for the object-storage REST API.
pub struct RemoteObjectFetcher {
    base: Option<Url>,
    trusted: TrustedHosts,
    service_key: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for RemoteObjectFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteObjectFetcher")
            .field("trusted_hosts", &self.trusted.len())
            .field("service_key", &"<redacted>")
            .finish()
    }
}

impl RemoteObjectFetcher {
    /// Build a fetcher. An unparseable `base_url` is accepted here and makes
    /// every fetch fail with `untrusted_host`.
    pub fn new(
        base_url: &str,
        public_url: Option<&str>,
        service_key: impl Into<String>,
        local_suffixes: &[String],
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let trusted = TrustedHosts::from_base_urls(
            std::iter::once(base_url).chain(public_url),
            local_suffixes,
        );
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            base: Url::parse(base_url.trim()).ok(),
            trusted,
            service_key: service_key.into(),
            client,
        })
    }

    /// Build from configuration; `None` when no storage URL + credential pair
    /// is configured.
    pub fn from_config(config: &VisionConfig) -> Result<Option<Self>, ConfigError> {
        if !config.remote_enabled() {
            return Ok(None);
        }
        let (Some(base), Some(key)) = (config.storage_url.as_deref(), config.service_key.as_deref())
        else {
            return Ok(None);
        };
        Self::new(
            base,
            config.public_storage_url.as_deref(),
            key,
            &config.local_host_suffixes,
            Duration::from_secs(config.fetch_timeout_secs),
        )
        .map(Some)
    }

    /// `{base}/storage/v1/object/{bucket}/{key}` with every segment
    /// percent-encoded.
    fn object_url(&self, bucket: &str, key: &str) -> Result<Url, FetchFailure> {
        let mut url = self.base.clone().ok_or(FetchFailure::UntrustedHost)?;
        let segments: Vec<&str> = key.split('/').filter(|s| !s.is_empty()).collect();
        let bad_segment = |s: &&str| *s == "." || *s == ".." || s.contains('\\');
        if segments.is_empty() || segments.iter().any(bad_segment) || bad_segment(&bucket) {
            return Err(FetchFailure::InvalidKey);
        }
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|_| FetchFailure::UntrustedHost)?
            .pop_if_empty()
            .extend(["storage", "v1", "object", bucket])
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl ObjectFetcher for RemoteObjectFetcher {
    async fn fetch(
        &self,
        submission_id: &str,
        bucket: &str,
        key: &str,
        max_bytes: u64,
    ) -> Result<Vec<u8>, FetchFailure> {
        let url = self.object_url(bucket, key)?;
        if !self.trusted.is_allowed(&url) {
            return Err(FetchFailure::UntrustedHost);
        }

        let mut response = self
            .client
            .get(url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .send()
            .await
            .map_err(|e| {
                debug!(submission_id = %submission_id, timeout = e.is_timeout(), "object request failed");
                FetchFailure::DownloadError
            })?;

        let status = response.status();
        if status.is_redirection() {
            return Err(FetchFailure::Redirect(status.as_u16()));
        }
        if !status.is_success() {
            return Err(FetchFailure::HttpError(status.as_u16()));
        }
        if status == StatusCode::NO_CONTENT {
            return Err(FetchFailure::Empty);
        }
        if response.content_length().is_some_and(|len| len > max_bytes) {
            return Err(FetchFailure::SizeExceeded);
        }

        let mut body = Vec::new();
        let mut total: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|_| FetchFailure::DownloadError)?
        {
            total += chunk.len() as u64;
            if total > max_bytes {
                return Err(FetchFailure::SizeExceeded);
            }
            body.extend_from_slice(&chunk);
        }
        if body.is_empty() {
            return Err(FetchFailure::Empty);
        }

        info!(
            action = "fetch_object",
            submission_id = %submission_id,
            bytes = body.len(),
            "object fetched"
        );
        Ok(body)
    }
}

/// Drop a leading `<bucket>/` from a storage key.
pub fn strip_bucket_prefix<'a>(key: &'a str, bucket: &str) -> &'a str {
    let key = key.trim_start_matches('/');
    key.strip_prefix(bucket)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(key)
}
