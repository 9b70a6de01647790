//! Raster frame abstraction.
//!
//! A [`Frame`] is one captured image: a tightly packed 8-bit buffer plus the
//! target it came from. Frames are owned by the loop iteration that produced
//! them and dropped once the pipeline returns.

use crate::types::{CaptureError, WindowId};
use image::{DynamicImage, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgb,
    Bgr,
    Rgba,
    Bgra,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb | PixelFormat::Bgr => 3,
            PixelFormat::Rgba | PixelFormat::Bgra => 4,
        }
    }
}

/// Where a frame was captured from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameSource {
    FullScreen,
    Window(WindowId),
    Region(String),
}

#[derive(Debug, Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
    source: FrameSource,
}

impl Frame {
    /// Wrap a raw buffer, checking its length against the dimensions
    pub fn from_raw(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
        source: FrameSource,
    ) -> Result<Self, CaptureError> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(CaptureError::BufferMismatch {
                width,
                height,
                format,
            });
        }
        Ok(Self {
            width,
            height,
            format,
            data,
            source,
        })
    }

    /// Zero-sized frame returned by capture sources on failure
    pub fn empty(source: FrameSource) -> Self {
        Self {
            width: 0,
            height: 0,
            format: PixelFormat::Rgb,
            data: Vec::new(),
            source,
        }
    }

    pub fn from_rgb_image(image: RgbImage, source: FrameSource) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            format: PixelFormat::Rgb,
            data: image.into_raw(),
            source,
        }
    }

    pub fn from_rgba_image(image: RgbaImage, source: FrameSource) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            format: PixelFormat::Rgba,
            data: image.into_raw(),
            source,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn source(&self) -> &FrameSource {
        &self.source
    }

    /// A zero-sized frame means "capture failed, skip this tick"
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.data.is_empty()
    }

    /// Convert to an `image` buffer, swizzling BGR(A) to RGB(A)
    pub fn to_image(&self) -> Result<DynamicImage, CaptureError> {
        if self.is_empty() {
            return Err(CaptureError::EmptyFrame);
        }

        let mismatch = || CaptureError::BufferMismatch {
            width: self.width,
            height: self.height,
            format: self.format,
        };

        let image = match self.format {
            PixelFormat::Rgb => RgbImage::from_raw(self.width, self.height, self.data.clone())
                .map(DynamicImage::ImageRgb8),
            PixelFormat::Rgba => RgbaImage::from_raw(self.width, self.height, self.data.clone())
                .map(DynamicImage::ImageRgba8),
            PixelFormat::Bgr => {
                let swapped = self
                    .data
                    .chunks_exact(3)
                    .flat_map(|px| [px[2], px[1], px[0]])
                    .collect();
                RgbImage::from_raw(self.width, self.height, swapped).map(DynamicImage::ImageRgb8)
            }
            PixelFormat::Bgra => {
                let swapped = self
                    .data
                    .chunks_exact(4)
                    .flat_map(|px| [px[2], px[1], px[0], px[3]])
                    .collect();
                RgbaImage::from_raw(self.width, self.height, swapped).map(DynamicImage::ImageRgba8)
            }
        };

        image.ok_or_else(mismatch)
    }
}
