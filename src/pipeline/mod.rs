//! Pipeline stages between a resolved submission and the model call.
//!
//! ## Data Flow
//!
//! ```text
//! image: source ───────────────────────────────────────┐
//! pdf:   derived ──▶ (source ──▶ render) ──▶ stitch ───┴──▶ encode ──▶ invoke ──▶ postprocess
//!        (tiers)     (original upload)       (composite)   (base64)   (client)   (fence unwrap)
//! ```
//!
//! 1. [`source`]  — local-first-then-remote bytes with size/hash checks
//! 2. [`derived`] — stitched-composite cache for PDFs; four tiers, first hit
//!    wins and producing tiers persist
//! 3. [`render`]  — rasterise an original PDF via pdfium; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 4. [`stitch`]  — compose page PNGs top-to-bottom into one image
//! 5. [`encode`]  — base64-wrap image bytes for the request body
//! 6. [`invoke`]  — shape the request from client capabilities, call under a
//!    timeout, classify failures
//! 7. [`postprocess`] — unwrap a response wholly enclosed in a code fence

pub mod derived;
pub mod encode;
pub mod invoke;
pub mod postprocess;
pub mod render;
pub mod source;
pub mod stitch;
