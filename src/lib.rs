//! # submission-vision
//!
//! Turn image and scanned-PDF submissions into Markdown with a vision/OCR
//! model, without trusting anything the submission names.
//!
//! ## Why this crate?
//!
//! A submission record points at bytes somewhere: a path under a shared
//! storage root, an object in a remote bucket, or pre-rendered page images
//! left behind by an earlier job. Every one of those is attacker-influenced.
//! This crate resolves the bytes under a path guard and an SSRF-safe fetch
//! policy, checks the declared size and sha256, and for PDFs maintains a
//! derived cache of one stitched composite so the model is called once per
//! document.
//!
//! ## Pipeline Overview
//!
//! ```text
//! SubmissionRef + JobPayload
//!  │
//!  ├─ 1. Merge    payload fields win over stored ones
//!  ├─ 2. Text     pass through, no model call
//!  ├─ 3. Guard    mime allow-list, storage key stays under the root
//!  ├─ 4. Bytes    image: local ─▶ remote   pdf: cached ─▶ pages ─▶ dir ─▶ render
//!  ├─ 5. Invoke   capability-shaped request under a timeout
//!  └─ 6. Output   Markdown + path-free metadata
//! ```
//!
//! Failures are [`VisionError`]s, each classified as
//! [`FailureClass::Transient`] (retry later) or [`FailureClass::Permanent`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use submission_vision::{JobPayload, OllamaClient, SubmissionRef, VisionConfig, VisionPipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // STORAGE_VERIFY_ROOT, SUPABASE_URL, AI_VISION_MODEL, OLLAMA_BASE_URL, ...
//!     let config = VisionConfig::from_env()?;
//!     let client = Arc::new(OllamaClient::from_config(&config)?);
//!     let pipeline = VisionPipeline::builder(config, client).build()?;
//!
//!     let submission: SubmissionRef = serde_json::from_str(&std::fs::read_to_string("sub.json")?)?;
//!     let result = pipeline.extract(&submission, &JobPayload::default()).await?;
//!     println!("{}", result.text);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `submission-vision` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! submission-vision = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod security;
pub mod storage;
pub mod submission;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use client::{ClientCapabilities, LlmProviderClient, OllamaClient, VisionClient};
pub use config::{LegacyScanLimits, VisionConfig, VisionConfigBuilder};
pub use error::{ConfigError, FailureClass, FetchFailure, VisionError};
pub use extract::{VisionPipeline, VisionPipelineBuilder};
pub use output::VisionResult;
pub use submission::{JobPayload, SubmissionKind, SubmissionRef, SupportedMime};
