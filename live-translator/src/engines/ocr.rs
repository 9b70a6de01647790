//! Command-line OCR engine.
//!
//! The frame is written to a temporary PNG and the engine is invoked with the
//! path. It must print `{"regions": [{"text", "x", "y", "width", "height",
//! "confidence"}]}` on stdout, or `{"error": "..."}`.

use super::{finish, resolve_command};
use crate::config::RecognitionEngineConfig;
use crate::frame::Frame;
use crate::recognition::RecognitionBackend;
use crate::types::{ConfidenceScale, EngineError, Rect, RecognizedRegion};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::process::Command;
use tracing::{debug, trace};

static CAPTURE_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Deserialize)]
struct OcrOutput {
    #[serde(default)]
    regions: Vec<OcrRegion>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OcrRegion {
    text: String,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    #[serde(default)]
    confidence: Option<f64>,
}

pub struct CommandRecognitionBackend {
    name: String,
    command: String,
    args: Vec<String>,
    languages: Vec<String>,
    scale: ConfidenceScale,
    /// Regions below this normalized confidence are dropped
    min_confidence: f32,
    timeout_secs: u64,
}

impl CommandRecognitionBackend {
    pub fn from_config(config: &RecognitionEngineConfig, min_confidence: f32, languages: &[String]) -> Self {
        Self {
            name: config.name.clone(),
            command: config.command.clone(),
            args: config.args.clone(),
            languages: languages.to_vec(),
            scale: if config.confidence_percent {
                ConfidenceScale::Percent
            } else {
                ConfidenceScale::Unit
            },
            min_confidence,
            timeout_secs: config.timeout_secs,
        }
    }

    /// Arguments for one invocation; the image path is appended when no
    /// argument names it
    fn build_args(&self, image_path: &str) -> Vec<String> {
        let languages = self.languages.join(",");
        let mut has_image = false;
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                if arg.contains("{image}") {
                    has_image = true;
                }
                arg.replace("{image}", image_path).replace("{languages}", &languages)
            })
            .collect();

        if !has_image {
            args.push(image_path.to_string());
        }
        args
    }

    /// Parse engine stdout into normalized regions
    fn parse_output(&self, stdout: &str) -> Result<Vec<RecognizedRegion>, EngineError> {
        let output: OcrOutput = serde_json::from_str(stdout)
            .map_err(|e| EngineError::Parse(format!("{}: {}", self.name, e)))?;

        if let Some(error) = output.error {
            return Err(EngineError::Failed(error));
        }

        let regions = output
            .regions
            .into_iter()
            .filter_map(|r| {
                let confidence = self.scale.normalize(r.confidence.unwrap_or(0.0));
                if confidence < self.min_confidence {
                    trace!("Dropping low-confidence region '{}' ({:.2})", r.text, confidence);
                    return None;
                }
                let bbox = Rect::new(
                    r.x.round() as i32,
                    r.y.round() as i32,
                    r.width.max(0.0).round() as u32,
                    r.height.max(0.0).round() as u32,
                );
                Some(RecognizedRegion::new(r.text, bbox, confidence))
            })
            .collect();

        Ok(regions)
    }

    fn temp_image_path(&self) -> PathBuf {
        let seq = CAPTURE_SEQ.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!(
            "live_translator_{}_{}_{}.png",
            self.name,
            std::process::id(),
            seq
        ))
    }
}

#[async_trait::async_trait]
impl RecognitionBackend for CommandRecognitionBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        resolve_command(&self.command).is_some()
    }

    async fn detect_text(&self, frame: &Frame) -> Result<Vec<RecognizedRegion>, EngineError> {
        let image = frame
            .to_image()
            .map_err(|e| EngineError::Failed(format!("frame conversion: {}", e)))?;

        let temp_path = self.temp_image_path();
        image
            .save(&temp_path)
            .map_err(|e| EngineError::Failed(format!("Failed to save temp image: {}", e)))?;

        let args = self.build_args(&temp_path.to_string_lossy());
        debug!("Running {} on {}x{} frame", self.name, frame.width(), frame.height());

        let mut command = Command::new(&self.command);
        command
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let result = finish(&self.name, self.timeout_secs, command.output()).await;

        // Clean up temp file
        let _ = std::fs::remove_file(&temp_path);

        let output = result?;
        self.parse_output(&String::from_utf8_lossy(&output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(percent: bool) -> CommandRecognitionBackend {
        CommandRecognitionBackend::from_config(
            &RecognitionEngineConfig {
                name: "tesseract".into(),
                command: "tess-json".into(),
                args: vec!["--lang".into(), "{languages}".into()],
                confidence_percent: percent,
                timeout_secs: 5,
            },
            0.7,
            &["ch_sim".to_string(), "en".to_string()],
        )
    }

    #[test]
    fn test_build_args_appends_image() {
        let args = backend(false).build_args("/tmp/f.png");
        assert_eq!(args, vec!["--lang", "ch_sim,en", "/tmp/f.png"]);
    }

    #[test]
    fn test_parse_percent_output() {
        let stdout = r#"{"regions": [
            {"text": "报警", "x": 10, "y": 20, "width": 60, "height": 18, "confidence": 93},
            {"text": "噪声", "x": 0, "y": 0, "width": 10, "height": 14, "confidence": 40}
        ]}"#;

        let regions = backend(true).parse_output(stdout).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].text, "报警");
        assert_eq!(regions[0].bbox, Rect::new(10, 20, 60, 18));
        assert!((regions[0].confidence - 0.93).abs() < 1e-6);
    }

    #[test]
    fn test_parse_error_output() {
        assert!(matches!(
            backend(false).parse_output(r#"{"error": "model missing"}"#),
            Err(EngineError::Failed(_))
        ));
        assert!(matches!(
            backend(false).parse_output("not json"),
            Err(EngineError::Parse(_))
        ));
    }

    #[test]
    fn test_unresolvable_command_is_unavailable() {
        let backend = CommandRecognitionBackend::from_config(
            &RecognitionEngineConfig {
                name: "ghost".into(),
                command: "no-such-ocr-binary-91c2".into(),
                args: vec![],
                confidence_percent: false,
                timeout_secs: 5,
            },
            0.7,
            &[],
        );
        assert!(!backend.is_available());
    }
}
