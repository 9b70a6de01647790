//! Frame clean-up ahead of text recognition.
//!
//! Grayscale, adaptive binarization, median denoise, then an integer upscale
//! when the frame is too small for engines to read. Regions found on an
//! upscaled frame are mapped back with [`rescale_regions`].

use crate::config::PreprocessConfig;
use crate::frame::Frame;
use crate::types::{CaptureError, Rect, RecognizedRegion};
use image::imageops::{self, FilterType};
use image::DynamicImage;
use imageproc::contrast::adaptive_threshold;
use imageproc::filter::median_filter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preprocessor {
    pub threshold_radius: u32,
    pub denoise_radius: u32,
    pub min_side: u32,
}

impl From<&PreprocessConfig> for Preprocessor {
    fn from(config: &PreprocessConfig) -> Self {
        Self {
            threshold_radius: config.threshold_radius,
            denoise_radius: config.denoise_radius,
            min_side: config.min_side,
        }
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::from(&PreprocessConfig::default())
    }
}

/// A cleaned frame and the factor it was enlarged by
#[derive(Debug, Clone)]
pub struct Prepared {
    pub frame: Frame,
    pub scale: u32,
}

impl Preprocessor {
    /// Upscale factor for a `width` x `height` frame: 1 when large enough,
    /// otherwise at least 2
    pub fn scale_for(&self, width: u32, height: u32) -> u32 {
        let shorter = width.min(height);
        if shorter == 0 || shorter >= self.min_side {
            1
        } else {
            (self.min_side / shorter).max(2)
        }
    }

    pub fn apply(&self, frame: &Frame) -> Result<Prepared, CaptureError> {
        let gray = frame.to_image()?.to_luma8();
        let binary = adaptive_threshold(&gray, self.threshold_radius);
        let cleaned = if self.denoise_radius > 0 {
            median_filter(&binary, self.denoise_radius, self.denoise_radius)
        } else {
            binary
        };

        let scale = self.scale_for(cleaned.width(), cleaned.height());
        let output = if scale > 1 {
            imageops::resize(
                &cleaned,
                cleaned.width() * scale,
                cleaned.height() * scale,
                FilterType::CatmullRom,
            )
        } else {
            cleaned
        };

        let rgb = DynamicImage::ImageLuma8(output).to_rgb8();
        Ok(Prepared {
            frame: Frame::from_rgb_image(rgb, frame.source().clone()),
            scale,
        })
    }
}

/// Map boxes from an upscaled frame back to capture pixels
pub fn rescale_regions(regions: Vec<RecognizedRegion>, scale: u32) -> Vec<RecognizedRegion> {
    if scale <= 1 {
        return regions;
    }
    let factor = scale as i32;
    regions
        .into_iter()
        .map(|mut region| {
            let b = region.bbox;
            region.bbox = Rect::new(b.x / factor, b.y / factor, b.width / scale, b.height / scale);
            region
        })
        .collect()
}
