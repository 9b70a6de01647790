//! Core types used throughout the live translator.
//!
//! This module defines the data flowing between the capture loop, the
//! recognition and translation gateways, and downstream consumers.

use serde::{Deserialize, Serialize};

/// Unique identifier for a window (platform-specific)
pub type WindowId = u64;

/// Screen rectangle in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Get the center point of the rectangle
    pub fn center(&self) -> (i32, i32) {
        (
            self.x + (self.width as i32 / 2),
            self.y + (self.height as i32 / 2),
        )
    }

    /// Check if a point is inside this rectangle
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x
            && x < self.x + self.width as i32
            && y >= self.y
            && y < self.y + self.height as i32
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// What a capture session watches. Exactly one is active per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MonitorTarget {
    FullScreen,
    Window {
        id: WindowId,
        /// Last-known bounds, used when the platform needs a rectangle
        bounds: Rect,
        #[serde(default)]
        title: String,
    },
    Region {
        rect: Rect,
        name: String,
    },
}

impl Default for MonitorTarget {
    fn default() -> Self {
        MonitorTarget::FullScreen
    }
}

impl MonitorTarget {
    pub fn describe(&self) -> String {
        match self {
            MonitorTarget::FullScreen => "full-screen".to_string(),
            MonitorTarget::Window { id, title, .. } if title.is_empty() => format!("window:{}", id),
            MonitorTarget::Window { title, .. } => format!("window:{}", title),
            MonitorTarget::Region { name, rect } => format!(
                "region:{} ({}x{} at {},{})",
                name, rect.width, rect.height, rect.x, rect.y
            ),
        }
    }
}

/// A visible top-level window as reported by the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub id: WindowId,
    pub title: String,
    /// Owning application name
    pub app_name: String,
    pub pid: u32,
    pub bounds: Rect,
}

impl WindowInfo {
    pub fn to_target(&self) -> MonitorTarget {
        MonitorTarget::Window {
            id: self.id,
            bounds: self.bounds,
            title: self.title.clone(),
        }
    }
}

/// How a backend reports confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceScale {
    /// Already in [0, 1]
    #[default]
    Unit,
    /// In [0, 100]; divided by 100 before a region is built
    Percent,
}

impl ConfidenceScale {
    pub fn normalize(self, raw: f64) -> f32 {
        let value = match self {
            ConfidenceScale::Unit => raw,
            ConfidenceScale::Percent => raw / 100.0,
        };
        if value.is_finite() {
            value.clamp(0.0, 1.0) as f32
        } else {
            0.0
        }
    }
}

/// A block of text found in a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedRegion {
    pub text: String,
    pub bbox: Rect,
    /// Normalized to [0, 1]
    pub confidence: f32,
}

impl RecognizedRegion {
    pub fn new(text: impl Into<String>, bbox: Rect, confidence: f32) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            text: text.into(),
            bbox,
            confidence,
        }
    }

    /// Build from a backend that reports 0-100
    pub fn from_percent(text: impl Into<String>, bbox: Rect, percent: f64) -> Self {
        Self::new(text, bbox, ConfidenceScale::Percent.normalize(percent))
    }
}

/// Result of translating one piece of text.
///
/// `translated_text == original_text` means no useful translation was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslatedRegion {
    pub original_text: String,
    pub translated_text: String,
    pub confidence: f32,
    pub source_lang: String,
    pub target_lang: String,
    pub glossary_hit: bool,
    pub matched_category: Option<String>,
}

impl TranslatedRegion {
    /// The canonical "translation failed" value
    pub fn identity(text: &str, source_lang: &str, target_lang: &str) -> Self {
        Self {
            original_text: text.to_string(),
            translated_text: text.to_string(),
            confidence: 0.0,
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            glossary_hit: false,
            matched_category: None,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.translated_text == self.original_text
    }
}

/// Errors reported by recognition and translation backends
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    #[error("Engine failed: {0}")]
    Failed(String),

    #[error("Engine timed out after {0}s")]
    Timeout(u64),

    #[error("Unparseable engine output: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors during frame acquisition or fingerprinting
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Captured frame is empty")]
    EmptyFrame,

    #[error("Frame buffer does not match {width}x{height} {format:?}")]
    BufferMismatch {
        width: u32,
        height: u32,
        format: crate::frame::PixelFormat,
    },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Capture worker failed: {0}")]
    Worker(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_center() {
        let rect = Rect::new(100, 200, 800, 600);
        assert_eq!(rect.center(), (500, 500));
    }

    #[test]
    fn test_rect_contains() {
        let rect = Rect::new(0, 0, 100, 100);
        assert!(rect.contains(50, 50));
        assert!(rect.contains(0, 0));
        assert!(!rect.contains(100, 100));
        assert!(!rect.contains(-1, 50));
    }

    #[test]
    fn test_percent_confidence_is_normalized() {
        let region = RecognizedRegion::from_percent("报警", Rect::new(0, 0, 40, 20), 87.0);
        assert!((region.confidence - 0.87).abs() < 1e-6);

        assert_eq!(ConfidenceScale::Percent.normalize(250.0), 1.0);
        assert_eq!(ConfidenceScale::Unit.normalize(f64::NAN), 0.0);
    }

    #[test]
    fn test_identity_translation() {
        let region = TranslatedRegion::identity("未知词汇", "auto", "en");
        assert!(region.is_identity());
        assert_eq!(region.confidence, 0.0);
        assert!(!region.glossary_hit);
    }

    #[test]
    fn test_monitor_target_toml_shape() {
        let target: MonitorTarget = toml::from_str(
            r#"
kind = "region"
name = "alarm bar"
rect = { x = 10, y = 20, width = 300, height = 40 }
"#,
        )
        .unwrap();

        assert_eq!(
            target,
            MonitorTarget::Region {
                rect: Rect::new(10, 20, 300, 40),
                name: "alarm bar".to_string(),
            }
        );
        assert!(target.describe().starts_with("region:alarm bar"));
    }
}
