//! Change detection using frame fingerprints.
//!
//! A fingerprint is computed from a small fixed-size grayscale downscale of the
//! frame, so its cost does not depend on the native resolution. Two algorithms
//! are available:
//!
//! - `Digest`: SHA-256 over the downscaled intensity bytes, truncated to 64 bits.
//!   Any pixel change that survives the downscale produces a new fingerprint.
//! - `Mean`: the average hash (aHash) over an 8x8 downscale. Tolerant of noise,
//!   blind to small text edits.
//!
//! Both are lossy. Collisions are accepted as a bounded-probability tradeoff.

use crate::config::FingerprintAlgorithm;
use crate::frame::Frame;
use crate::types::CaptureError;
use image::imageops::FilterType;
use image::DynamicImage;
use sha2::{Digest, Sha256};
use tracing::trace;

/// aHash grid size (8x8 = 64 bits)
const AHASH_SIZE: u32 = 8;

/// Fingerprint value (64-bit)
pub type Fingerprint = u64;

#[derive(Debug, Clone, Copy)]
pub struct Fingerprinter {
    algorithm: FingerprintAlgorithm,
    hash_size: u32,
}

impl Fingerprinter {
    pub fn new(algorithm: FingerprintAlgorithm, hash_size: u32) -> Self {
        Self {
            algorithm,
            hash_size: hash_size.max(1),
        }
    }

    pub fn fingerprint(&self, frame: &Frame) -> Result<Fingerprint, CaptureError> {
        let image = frame.to_image()?;
        Ok(match self.algorithm {
            FingerprintAlgorithm::Digest => compute_digest(&image, self.hash_size),
            FingerprintAlgorithm::Mean => compute_ahash(&image),
        })
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new(FingerprintAlgorithm::Digest, 32)
    }
}

/// Holds the last accepted fingerprint. Owned by the capture loop.
#[derive(Debug, Default)]
pub struct FrameGate {
    last: Option<Fingerprint>,
}

impl FrameGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` and records the fingerprint when it differs from the
    /// last accepted one. The first fingerprint is always accepted.
    pub fn admit(&mut self, fingerprint: Fingerprint) -> bool {
        match self.last {
            Some(prev) if prev == fingerprint => {
                trace!("Fingerprint {} unchanged", hash_to_hex(fingerprint));
                false
            }
            _ => {
                trace!("Fingerprint changed to {}", hash_to_hex(fingerprint));
                self.last = Some(fingerprint);
                true
            }
        }
    }

    pub fn last(&self) -> Option<Fingerprint> {
        self.last
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Downscale, convert to grayscale and digest the intensity bytes
pub fn compute_digest(image: &DynamicImage, size: u32) -> Fingerprint {
    let gray = image.resize_exact(size, size, FilterType::Triangle).to_luma8();

    let digest = Sha256::digest(gray.as_raw());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Compute average hash (aHash) for an image
///
/// Algorithm:
/// 1. Resize to 8x8
/// 2. Convert to grayscale
/// 3. Calculate average brightness
/// 4. Generate 64-bit hash: bit=1 if pixel > average, else 0
pub fn compute_ahash(image: &DynamicImage) -> Fingerprint {
    let gray = image
        .resize_exact(AHASH_SIZE, AHASH_SIZE, FilterType::Nearest)
        .to_luma8();

    let sum: u32 = gray.pixels().map(|p| p.0[0] as u32).sum();
    let avg = (sum / (AHASH_SIZE * AHASH_SIZE)) as u8;

    let mut hash: Fingerprint = 0;
    for (i, pixel) in gray.pixels().enumerate() {
        if pixel.0[0] > avg {
            hash |= 1 << i;
        }
    }

    hash
}

/// Number of bits that differ (0-64)
pub fn hamming_distance(a: Fingerprint, b: Fingerprint) -> u32 {
    (a ^ b).count_ones()
}

/// Convert hash to hex string for debugging
pub fn hash_to_hex(hash: Fingerprint) -> String {
    format!("{:016x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameSource;
    use image::{Rgb, RgbImage};

    fn solid_frame(brightness: u8) -> Frame {
        let mut img = RgbImage::new(100, 100);
        for pixel in img.pixels_mut() {
            *pixel = Rgb([brightness, brightness, brightness]);
        }
        Frame::from_rgb_image(img, FrameSource::FullScreen)
    }

    fn half_frame() -> Frame {
        let mut img = RgbImage::new(100, 100);
        for (x, _, pixel) in img.enumerate_pixels_mut() {
            let brightness = if x < 50 { 0 } else { 255 };
            *pixel = Rgb([brightness, brightness, brightness]);
        }
        Frame::from_rgb_image(img, FrameSource::FullScreen)
    }

    #[test]
    fn test_hamming_distance() {
        assert_eq!(hamming_distance(0, 0), 0);
        assert_eq!(hamming_distance(0, 0xFF), 8);
        assert_eq!(hamming_distance(0, u64::MAX), 64);
    }

    #[test]
    fn test_identical_frames_same_fingerprint() {
        let fp = Fingerprinter::default();
        assert_eq!(
            fp.fingerprint(&solid_frame(128)).unwrap(),
            fp.fingerprint(&solid_frame(128)).unwrap()
        );
    }

    #[test]
    fn test_digest_sees_small_change() {
        let fp = Fingerprinter::default();
        assert_ne!(
            fp.fingerprint(&solid_frame(128)).unwrap(),
            fp.fingerprint(&solid_frame(129)).unwrap()
        );
    }

    #[test]
    fn test_mean_hash_distance() {
        let black = solid_frame(0).to_image().unwrap();
        let half = half_frame().to_image().unwrap();
        assert!(hamming_distance(compute_ahash(&black), compute_ahash(&half)) > 0);
    }

    #[test]
    fn test_empty_frame_is_an_error() {
        let fp = Fingerprinter::new(FingerprintAlgorithm::Mean, 8);
        assert!(fp.fingerprint(&Frame::empty(FrameSource::FullScreen)).is_err());
    }

    #[test]
    fn test_gate_admits_changes_only() {
        let mut gate = FrameGate::new();
        assert!(gate.admit(1));
        assert!(!gate.admit(1));
        assert!(gate.admit(2));
        assert_eq!(gate.last(), Some(2));

        gate.reset();
        assert!(gate.admit(2));
    }

    #[test]
    fn test_hash_to_hex() {
        assert_eq!(hash_to_hex(0), "0000000000000000");
        assert_eq!(hash_to_hex(u64::MAX), "ffffffffffffffff");
    }
}
