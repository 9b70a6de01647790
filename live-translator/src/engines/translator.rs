//! Command-line translation engine.
//!
//! Each call spawns the configured program, writes a JSON request to its
//! stdin and reads `{"translated_text": "...", "confidence": 0.8}` from stdout.

use super::{finish, resolve_command};
use crate::config::TranslationEngineConfig;
use crate::translation::TranslationBackend;
use crate::types::{EngineError, TranslatedRegion};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::trace;

/// Used when the engine does not report a confidence
const DEFAULT_ENGINE_CONFIDENCE: f32 = 0.8;

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    text: &'a str,
    source_lang: &'a str,
    target_lang: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(default)]
    translated_text: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
    /// Detected language when the request asked for "auto"
    #[serde(default)]
    source_lang: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub struct CommandTranslationBackend {
    name: String,
    command: String,
    args: Vec<String>,
    timeout_secs: u64,
}

impl CommandTranslationBackend {
    pub fn from_config(config: &TranslationEngineConfig) -> Self {
        Self {
            name: config.name.clone(),
            command: config.command.clone(),
            args: config.args.clone(),
            timeout_secs: config.timeout_secs,
        }
    }

    fn parse_response(
        &self,
        stdout: &str,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<TranslatedRegion, EngineError> {
        let response: TranslateResponse = serde_json::from_str(stdout)
            .map_err(|e| EngineError::Parse(format!("{}: {}", self.name, e)))?;

        if let Some(error) = response.error {
            return Err(EngineError::Failed(error));
        }

        let translated_text = response
            .translated_text
            .ok_or_else(|| EngineError::Parse(format!("{}: missing translated_text", self.name)))?;

        let confidence = response
            .confidence
            .filter(|c| c.is_finite())
            .unwrap_or(DEFAULT_ENGINE_CONFIDENCE)
            .clamp(0.0, 1.0);

        Ok(TranslatedRegion {
            original_text: text.to_string(),
            translated_text,
            confidence,
            source_lang: response.source_lang.unwrap_or_else(|| source_lang.to_string()),
            target_lang: target_lang.to_string(),
            glossary_hit: false,
            matched_category: None,
        })
    }
}

#[async_trait::async_trait]
impl TranslationBackend for CommandTranslationBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        resolve_command(&self.command).is_some()
    }

    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<TranslatedRegion, EngineError> {
        let request = serde_json::to_vec(&TranslateRequest {
            text,
            source_lang,
            target_lang,
        })
        .map_err(|e| EngineError::Failed(e.to_string()))?;

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&request).await?;
            // Dropping stdin closes the pipe so the engine sees EOF
        }

        let output = finish(&self.name, self.timeout_secs, child.wait_with_output()).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        trace!("{} output: {}", self.name, stdout.trim());

        self.parse_response(&stdout, text, source_lang, target_lang)
    }
}
