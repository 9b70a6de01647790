//! Live Translator - change-gated screen text translation
//!
//! This crate watches a screen target (full screen, a window or a named
//! rectangle), recognizes text only when the picture changes, and translates
//! it with a curated glossary taking precedence over machine translation.
//!
//! # Architecture
//!
//! ```text
//! CaptureLoop --frame--> Pipeline --cleaned--> RecognitionGateway
//!                            |
//!                            +--text--> TranslationGateway (glossary first)
//!                            |
//!                            +--batch--> consumer callback
//! ```
//!
//! The [`Controller`] owns the loop and the pipeline; external inputs reach it
//! through a [`ControlHandle`] command queue.

pub mod canonicalize;
pub mod capture;
pub mod capture_loop;
pub mod change_detector;
pub mod config;
pub mod controller;
pub mod engines;
pub mod frame;
pub mod logging;
pub mod pipeline;
pub mod preprocess;
pub mod profiles;
pub mod recognition;
pub mod translation;
pub mod types;

// Re-export commonly used types
pub use capture::{CaptureSource, ScreenCapture};
pub use capture_loop::{CaptureLoop, FrameSink, LoopSettings};
pub use change_detector::{compute_ahash, hamming_distance, Fingerprint, Fingerprinter, FrameGate};
pub use config::{Config, ConfigError, LoadOutcome};
pub use controller::{control_channel, ControlCommand, ControlError, ControlHandle, Controller, SessionStatus};
pub use frame::{Frame, FrameSource, PixelFormat};
pub use pipeline::{BatchConsumer, Pipeline, PipelineSettings, TranslationBatch};
pub use preprocess::Preprocessor;
pub use profiles::{Profile, ProfileManager};
pub use recognition::{filter_noise, RecognitionBackend, RecognitionGateway};
pub use translation::{TranslationBackend, TranslationGateway};
pub use types::{
    CaptureError, EngineError, MonitorTarget, Rect, RecognizedRegion, TranslatedRegion, WindowId,
    WindowInfo,
};

pub use glossary_store::GlossaryStore;
