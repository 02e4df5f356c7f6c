//! Page stitching: stack page images into one tall PNG composite.
//!
//! Vision backends that accept a single image per call still get the whole
//! document this way. Pages keep their pixel size; narrower pages are centred
//! on a white canvas as wide as the widest page.

use image::{imageops, DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use thiserror::Error;

/// Hard ceiling on the composite height in pixels.
pub const MAX_COMPOSITE_HEIGHT: u32 = 60_000;
/// Hard ceiling on the composite width in pixels.
pub const MAX_COMPOSITE_WIDTH: u32 = 10_000;

#[derive(Debug, Clone, Error)]
pub enum StitchError {
    #[error("no pages to stitch")]
    NoPages,

    #[error("page {page} is not a decodable image: {detail}")]
    Decode { page: usize, detail: String },

    #[error("composite of {height}px exceeds the {limit}px limit")]
    TooTall { height: u64, limit: u32 },

    #[error("composite width of {width}px exceeds the {limit}px limit")]
    TooWide { width: u32, limit: u32 },

    #[error("failed to encode composite: {0}")]
    Encode(String),
}

/// Combines ordered page images into one image.
pub trait PageStitcher: Send + Sync {
    fn stitch(&self, pages: &[Vec<u8>]) -> Result<Vec<u8>, StitchError>;
}

/// Top-to-bottom stacking on a white canvas.
#[derive(Debug, Clone)]
pub struct VerticalStitcher {
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for VerticalStitcher {
    fn default() -> Self {
        Self {
            max_width: MAX_COMPOSITE_WIDTH,
            max_height: MAX_COMPOSITE_HEIGHT,
        }
    }
}

impl PageStitcher for VerticalStitcher {
    fn stitch(&self, pages: &[Vec<u8>]) -> Result<Vec<u8>, StitchError> {
        if pages.is_empty() {
            return Err(StitchError::NoPages);
        }
        let decoded = pages
            .iter()
            .enumerate()
            .map(|(i, bytes)| {
                image::load_from_memory(bytes).map_err(|e| StitchError::Decode {
                    page: i + 1,
                    detail: e.to_string(),
                })
            })
            .collect::<Result<Vec<DynamicImage>, _>>()?;

        let width = decoded.iter().map(DynamicImage::width).max().unwrap_or(0);
        let height: u64 = decoded.iter().map(|img| u64::from(img.height())).sum();
        if width == 0 || height == 0 {
            return Err(StitchError::NoPages);
        }
        if width > self.max_width {
            return Err(StitchError::TooWide {
                width,
                limit: self.max_width,
            });
        }
        if height > u64::from(self.max_height) {
            return Err(StitchError::TooTall {
                height,
                limit: self.max_height,
            });
        }

        let mut canvas = RgbImage::from_pixel(width, height as u32, Rgb([255, 255, 255]));
        let mut y: i64 = 0;
        for img in &decoded {
            let x = i64::from((width - img.width()) / 2);
            imageops::overlay(&mut canvas, &img.to_rgb8(), x, y);
            y += i64::from(img.height());
        }

        let mut png = Vec::new();
        DynamicImage::ImageRgb8(canvas)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| StitchError::Encode(e.to_string()))?;
        Ok(png)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(width: u32, height: u32, shade: u8) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([shade; 3])));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png).unwrap();
        out
    }

    #[test]
    fn stacks_pages_vertically() {
        let out = VerticalStitcher::default()
            .stitch(&[png(10, 5, 0), png(10, 7, 0)])
            .unwrap();
        let img = image::load_from_memory(&out).unwrap();
        assert_eq!((img.width(), img.height()), (10, 12));
    }

    #[test]
    fn narrow_pages_are_centred_on_white() {
        let out = VerticalStitcher::default()
            .stitch(&[png(10, 2, 0), png(4, 2, 0)])
            .unwrap();
        let img = image::load_from_memory(&out).unwrap().to_rgb8();
        assert_eq!(img.get_pixel(0, 3), &Rgb([255, 255, 255]));
        assert_eq!(img.get_pixel(5, 3), &Rgb([0, 0, 0]));
        assert_eq!(img.get_pixel(9, 3), &Rgb([255, 255, 255]));
    }

    #[test]
    fn page_order_is_preserved() {
        let out = VerticalStitcher::default()
            .stitch(&[png(2, 1, 10), png(2, 1, 200)])
            .unwrap();
        let img = image::load_from_memory(&out).unwrap().to_rgb8();
        assert_eq!(img.get_pixel(0, 0), &Rgb([10, 10, 10]));
        assert_eq!(img.get_pixel(0, 1), &Rgb([200, 200, 200]));
    }

    #[test]
    fn empty_input_fails() {
        assert!(matches!(
            VerticalStitcher::default().stitch(&[]),
            Err(StitchError::NoPages)
        ));
    }

    #[test]
    fn garbage_page_fails() {
        let err = VerticalStitcher::default()
            .stitch(&[png(2, 2, 0), b"not an image".to_vec()])
            .unwrap_err();
        assert!(matches!(err, StitchError::Decode { page: 2, .. }));
    }

    #[test]
    fn height_limit_enforced() {
        let s = VerticalStitcher {
            max_height: 5,
            ..VerticalStitcher::default()
        };
        assert!(matches!(
            s.stitch(&[png(2, 3, 0), png(2, 3, 0)]),
            Err(StitchError::TooTall { height: 6, .. })
        ));
    }

    #[test]
    fn width_limit_enforced_before_allocation() {
        let s = VerticalStitcher {
            max_width: 8,
            ..VerticalStitcher::default()
        };
        assert!(matches!(
            s.stitch(&[png(4, 2, 0), png(9, 1, 0)]),
            Err(StitchError::TooWide { width: 9, limit: 8 })
        ));
        assert!(s.stitch(&[png(8, 2, 0)]).is_ok());
    }
}
