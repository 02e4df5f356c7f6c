//! PDF rasterisation: render a scanned PDF's pages to PNG via pdfium.
//!
//! ## Why a trait?
//!
//! The derived cache only needs "PDF bytes in, page PNGs out". Putting that
//! behind [`PdfRenderer`] keeps pdfium out of every test that exercises the
//! cache tiers, and lets deployments without pdfium swap in another
//! rasteriser.
//!
//! ## Blocking
//!
//! `render` is synchronous and CPU-bound. The cache calls it through
//! `tokio::task::spawn_blocking` so Tokio workers never stall on pdfium.

use crate::config::VisionConfig;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

/// One rendered page, PNG-encoded.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// 0-based page index in the source document.
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

/// Why rendering produced nothing.
///
/// Messages never contain a path: the renderer only ever sees bytes.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// The pdfium shared library could not be loaded.
    #[error("failed to bind pdfium: {0}")]
    Bind(String),

    /// pdfium refused to open the document (corrupt, encrypted, ...).
    #[error("failed to open document: {0}")]
    Open(String),

    /// A page could not be rasterised.
    #[error("page {page} failed to render: {detail}")]
    Page { page: usize, detail: String },

    /// A rendered page could not be PNG-encoded.
    #[error("failed to encode page {page}: {detail}")]
    Encode { page: usize, detail: String },
}

impl RenderError {
    /// Short token for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RenderError::Bind(_) => "bind",
            RenderError::Open(_) => "open",
            RenderError::Page { .. } => "page",
            RenderError::Encode { .. } => "encode",
        }
    }
}

/// Rasterises a PDF held in memory.
pub trait PdfRenderer: Send + Sync {
    fn render(&self, pdf: &[u8]) -> Result<Vec<RenderedPage>, RenderError>;
}

/// pdfium-backed renderer.
#[derive(Debug, Clone)]
pub struct PdfiumRenderer {
    pub dpi: u32,
    pub max_pixels: u32,
    pub page_limit: usize,
    pub grayscale: bool,
    pub library_path: Option<PathBuf>,
}

impl Default for PdfiumRenderer {
    fn default() -> Self {
        Self::from_config(&VisionConfig::default())
    }
}

impl PdfiumRenderer {
    pub fn from_config(config: &VisionConfig) -> Self {
        Self {
            dpi: config.render_dpi,
            max_pixels: config.max_rendered_pixels,
            page_limit: config.render_page_limit,
            grayscale: config.grayscale,
            library_path: config.pdfium_library_path.clone(),
        }
    }

    /// Bind `library_path` when set (a file, or a directory holding the
    /// platform library), else the system library.
    fn bind(&self) -> Result<Pdfium, RenderError> {
        let bindings = match &self.library_path {
            Some(path) if path.is_dir() => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
            }
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| RenderError::Bind(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }

    fn render_config(&self) -> PdfRenderConfig {
        PdfRenderConfig::new()
            .scale_page_by_factor(self.dpi as f32 / 72.0)
            .set_maximum_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32)
    }

    fn encode(&self, index: usize, image: DynamicImage) -> Result<RenderedPage, RenderError> {
        let image = if self.grayscale {
            DynamicImage::ImageLuma8(image.to_luma8())
        } else {
            image
        };
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|e| RenderError::Encode {
                page: index + 1,
                detail: e.to_string(),
            })?;
        Ok(RenderedPage {
            index,
            width: image.width(),
            height: image.height(),
            png,
        })
    }
}

impl PdfRenderer for PdfiumRenderer {
    fn render(&self, pdf: &[u8]) -> Result<Vec<RenderedPage>, RenderError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| RenderError::Open(format!("{:?}", e)))?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        let wanted = total_pages.min(self.page_limit);
        if wanted < total_pages {
            warn!(
                pages = total_pages,
                rendered = wanted,
                "page limit reached; trailing pages skipped"
            );
        }

        let render_config = self.render_config();
        let mut results = Vec::with_capacity(wanted);
        for idx in 0..wanted {
            let page = pages.get(idx as u16).map_err(|e| RenderError::Page {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;
            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| RenderError::Page {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                })?;
            let rendered = self.encode(idx, bitmap.as_image())?;
            debug!(
                page = idx + 1,
                width = rendered.width,
                height = rendered.height,
                "page rendered"
            );
            results.push(rendered);
        }

        info!(pages = results.len(), "pdf rendered");
        Ok(results)
    }
}
