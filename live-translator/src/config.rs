//! Configuration management for the live translator.
//!
//! Loads configuration from TOML files and provides runtime defaults.

use crate::types::MonitorTarget;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Upper bound on the capture rate
const MAX_FPS: f64 = 60.0;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub recognition: RecognitionConfig,

    #[serde(default)]
    pub translation: TranslationConfig,

    #[serde(default)]
    pub glossary: GlossaryConfig,

    /// Target watched when a session starts
    #[serde(default)]
    pub target: MonitorTarget,

    /// Directory of application profile JSON files
    #[serde(default)]
    pub profiles_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintAlgorithm {
    /// Digest of the downscaled intensity bytes
    #[default]
    Digest,
    /// Average hash over the downscaled intensity bytes
    Mean,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Target captures per second
    #[serde(default = "default_fps")]
    pub fps: f64,

    /// Sleep between rate checks while waiting for the next tick
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Wait after a failed capture before retrying
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// How long stop() waits for the worker to exit
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_ms: u64,

    /// Side length of the downscaled fingerprint image
    #[serde(default = "default_hash_size")]
    pub hash_size: u32,

    #[serde(default)]
    pub fingerprint: FingerprintAlgorithm,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            poll_interval_ms: default_poll_interval(),
            retry_backoff_ms: default_retry_backoff(),
            stop_timeout_ms: default_stop_timeout(),
            hash_size: default_hash_size(),
            fingerprint: FingerprintAlgorithm::default(),
        }
    }
}

impl CaptureConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// An external OCR program
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionEngineConfig {
    pub name: String,

    /// Executable name or path
    pub command: String,

    /// Arguments; `{image}` and `{languages}` are substituted per call
    #[serde(default)]
    pub args: Vec<String>,

    /// Engine reports confidence as 0-100
    #[serde(default)]
    pub confidence_percent: bool,

    #[serde(default = "default_engine_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// Preferred engine name
    #[serde(default = "default_recognition_engine")]
    pub engine: String,

    /// Regions shorter than this many pixels are noise
    #[serde(default = "default_min_text_height")]
    pub min_text_height: u32,

    /// Regions below this confidence are dropped by the engine adapter
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Recognition languages passed to engines that accept them
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,

    #[serde(default)]
    pub preprocess: PreprocessConfig,

    #[serde(default)]
    pub engines: Vec<RecognitionEngineConfig>,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            engine: default_recognition_engine(),
            min_text_height: default_min_text_height(),
            confidence_threshold: default_confidence_threshold(),
            languages: default_languages(),
            preprocess: PreprocessConfig::default(),
            engines: Vec::new(),
        }
    }
}

/// Image clean-up applied to every frame before recognition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Neighbourhood radius of the adaptive threshold
    #[serde(default = "default_threshold_radius")]
    pub threshold_radius: u32,

    /// Median filter radius; 0 disables denoising
    #[serde(default = "default_denoise_radius")]
    pub denoise_radius: u32,

    /// Frames whose shorter side is below this are upscaled
    #[serde(default = "default_min_side")]
    pub min_side: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_radius: default_threshold_radius(),
            denoise_radius: default_denoise_radius(),
            min_side: default_min_side(),
        }
    }
}

/// An external translator program
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationEngineConfig {
    pub name: String,
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_engine_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    #[serde(default = "default_translation_engine")]
    pub primary_engine: String,

    #[serde(default = "default_source_lang")]
    pub source_lang: String,

    #[serde(default = "default_target_lang")]
    pub target_lang: String,

    #[serde(default = "default_true")]
    pub use_glossary: bool,

    #[serde(default)]
    pub engines: Vec<TranslationEngineConfig>,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            primary_engine: default_translation_engine(),
            source_lang: default_source_lang(),
            target_lang: default_target_lang(),
            use_glossary: true,
            engines: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlossaryConfig {
    /// Database path; the platform data dir when unset
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub seed_defaults: bool,

    /// JSON glossaries imported at startup
    #[serde(default)]
    pub import: Vec<PathBuf>,
}

impl Default for GlossaryConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            seed_defaults: true,
            import: Vec::new(),
        }
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_fps() -> f64 {
    2.0
}

fn default_poll_interval() -> u64 {
    100
}

fn default_retry_backoff() -> u64 {
    1000
}

fn default_stop_timeout() -> u64 {
    2000
}

fn default_hash_size() -> u32 {
    32
}

fn default_engine_timeout() -> u64 {
    30
}

fn default_recognition_engine() -> String {
    "paddleocr".to_string()
}

fn default_min_text_height() -> u32 {
    12
}

fn default_confidence_threshold() -> f32 {
    0.7
}

fn default_languages() -> Vec<String> {
    vec!["ch_sim".to_string(), "en".to_string()]
}

fn default_threshold_radius() -> u32 {
    5
}

fn default_denoise_radius() -> u32 {
    1
}

fn default_min_side() -> u32 {
    100
}

fn default_translation_engine() -> String {
    "google".to_string()
}

fn default_source_lang() -> String {
    "zh".to_string()
}

fn default_target_lang() -> String {
    "en".to_string()
}

/// Where a loaded configuration came from. Loading happens before the log
/// sink exists, so the outcome is kept and logged afterwards.
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(PathBuf),
    Missing(PathBuf),
    Invalid(PathBuf, ConfigError),
}

impl LoadOutcome {
    pub fn log(&self) {
        match self {
            LoadOutcome::Loaded(path) => info!("Loaded configuration from {:?}", path),
            LoadOutcome::Missing(path) => {
                info!("No config file found at {:?}, using defaults", path)
            }
            LoadOutcome::Invalid(path, e) => {
                warn!("Failed to load config file {:?}: {}, using defaults", path, e)
            }
        }
    }

    pub fn used_defaults(&self) -> bool {
        !matches!(self, LoadOutcome::Loaded(_))
    }
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> (Self, LoadOutcome) {
        Self::load_from_path(Self::default_config_path())
    }

    /// Load configuration from a specific path, falling back to defaults
    pub fn load_from_path(path: PathBuf) -> (Self, LoadOutcome) {
        match Self::try_load_from_path(&path) {
            Ok(config) => (config, LoadOutcome::Loaded(path)),
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                (Self::default(), LoadOutcome::Missing(path))
            }
            Err(e) => (Self::default(), LoadOutcome::Invalid(path, e)),
        }
    }

    /// Load and validate, surfacing every failure
    pub fn try_load_from_path(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("live-translator")
            .join("config.toml")
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: PathBuf) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;

        std::fs::write(&path, contents)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let capture = &self.capture;
        if !capture.fps.is_finite() || capture.fps <= 0.0 || capture.fps > MAX_FPS {
            return Err(ConfigError::Invalid(format!(
                "capture.fps must be in (0, {}], got {}",
                MAX_FPS, capture.fps
            )));
        }
        if capture.hash_size == 0 {
            return Err(ConfigError::Invalid("capture.hash_size must be positive".into()));
        }
        if capture.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("capture.poll_interval_ms must be positive".into()));
        }

        let threshold = self.recognition.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid(format!(
                "recognition.confidence_threshold must be in [0, 1], got {}",
                threshold
            )));
        }

        if self.recognition.preprocess.threshold_radius == 0 {
            return Err(ConfigError::Invalid(
                "recognition.preprocess.threshold_radius must be positive".into(),
            ));
        }

        let mut names = std::collections::HashSet::new();
        for engine in &self.recognition.engines {
            if engine.name.trim().is_empty() || engine.command.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "recognition engines need a name and a command".into(),
                ));
            }
            if !names.insert(engine.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate recognition engine '{}'",
                    engine.name
                )));
            }
        }

        names.clear();
        for engine in &self.translation.engines {
            if engine.name.trim().is_empty() || engine.command.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "translation engines need a name and a command".into(),
                ));
            }
            if !names.insert(engine.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate translation engine '{}'",
                    engine.name
                )));
            }
        }

        if self.translation.target_lang.trim().is_empty() {
            return Err(ConfigError::Invalid("translation.target_lang is empty".into()));
        }

        Ok(())
    }

    /// Set one field by dotted path. Only the fields a profile may override
    /// are reachable; anything else is rejected.
    pub fn apply_override(&mut self, path: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |what: &str| ConfigError::Invalid(format!("{} for {}: '{}'", what, path, value));

        match path {
            "recognition.engine" => self.recognition.engine = value.to_string(),
            "recognition.min_text_height" => {
                self.recognition.min_text_height =
                    value.parse().map_err(|_| invalid("expected an integer"))?;
            }
            "recognition.confidence_threshold" => {
                let threshold: f32 = value.parse().map_err(|_| invalid("expected a number"))?;
                if !(0.0..=1.0).contains(&threshold) {
                    return Err(invalid("out of range"));
                }
                self.recognition.confidence_threshold = threshold;
            }
            "recognition.languages" => {
                self.recognition.languages = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
            }
            "translation.source_lang" => self.translation.source_lang = value.to_string(),
            "translation.target_lang" => self.translation.target_lang = value.to_string(),
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "'{}' cannot be overridden",
                    path
                )))
            }
        }

        Ok(())
    }
}
