//! Recognition gateway.
//!
//! Holds the recognition backends that reported themselves available at
//! construction and routes each frame to one of them. The gateway never
//! returns an error: a missing engine or a failed call yields no regions.

use crate::frame::Frame;
use crate::types::{EngineError, RecognizedRegion};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A text recognition engine
#[async_trait::async_trait]
pub trait RecognitionBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Checked once when the gateway is built
    fn is_available(&self) -> bool;

    async fn detect_text(&self, frame: &Frame) -> Result<Vec<RecognizedRegion>, EngineError>;
}

pub struct RecognitionGateway {
    /// Available backends, in configured order
    backends: Vec<Arc<dyn RecognitionBackend>>,
    primary: Option<usize>,
}

impl RecognitionGateway {
    /// Check `candidates` and pick a primary: `preferred` if available,
    /// otherwise the first available backend.
    pub fn new(candidates: Vec<Arc<dyn RecognitionBackend>>, preferred: &str) -> Self {
        let total = candidates.len();
        let backends: Vec<_> = candidates
            .into_iter()
            .filter(|backend| {
                let available = backend.is_available();
                if !available {
                    debug!("Recognition engine '{}' not available", backend.name());
                }
                available
            })
            .collect();

        let primary = backends
            .iter()
            .position(|b| b.name() == preferred)
            .or(if backends.is_empty() { None } else { Some(0) });

        match primary {
            Some(index) => {
                let name = backends[index].name();
                if name != preferred {
                    info!(
                        "Preferred recognition engine '{}' unavailable, using '{}'",
                        preferred, name
                    );
                } else {
                    info!("Recognition engine: {} ({}/{} available)", name, backends.len(), total);
                }
            }
            None => warn!("No recognition engine available; frames will yield no text"),
        }

        Self { backends, primary }
    }

    pub fn is_available(&self) -> bool {
        self.primary.is_some()
    }

    pub fn primary_name(&self) -> Option<&str> {
        self.primary.map(|i| self.backends[i].name())
    }

    pub fn available_engines(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    /// Recognize text with `engine_override` when it names an available
    /// backend, else with the primary.
    pub async fn detect_text(&self, frame: &Frame, engine_override: Option<&str>) -> Vec<RecognizedRegion> {
        let backend = match self.select(engine_override) {
            Some(backend) => backend,
            None => return Vec::new(),
        };

        match backend.detect_text(frame).await {
            Ok(regions) => {
                debug!("{} found {} regions", backend.name(), regions.len());
                regions
            }
            Err(e) => {
                warn!("Recognition with {} failed: {}", backend.name(), e);
                Vec::new()
            }
        }
    }

    fn select(&self, engine_override: Option<&str>) -> Option<&Arc<dyn RecognitionBackend>> {
        if let Some(name) = engine_override {
            if let Some(backend) = self.backends.iter().find(|b| b.name() == name) {
                return Some(backend);
            }
            debug!("Engine override '{}' not available, using primary", name);
        }
        self.primary.map(|i| &self.backends[i])
    }
}

/// Drop regions that are too short or whose trimmed text is a single
/// character or less.
pub fn filter_noise(regions: Vec<RecognizedRegion>, min_height: u32) -> Vec<RecognizedRegion> {
    let before = regions.len();
    let kept: Vec<_> = regions
        .into_iter()
        .filter(|r| r.bbox.height >= min_height && r.text.trim().chars().count() > 1)
        .collect();

    if kept.len() != before {
        debug!("Filtered {} noise regions", before - kept.len());
    }
    kept
}
