//! External engine integrations.
//!
//! Recognition and translation engines are separate programs that speak JSON
//! over stdio. This module builds them from configuration:
//!
//! - [`ocr::CommandRecognitionBackend`]: image path in, text regions out
//! - [`translator::CommandTranslationBackend`]: request on stdin, translation out

pub mod ocr;
pub mod translator;

use crate::config::{RecognitionConfig, TranslationConfig};
use crate::recognition::RecognitionBackend;
use crate::translation::TranslationBackend;
use crate::types::EngineError;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub use ocr::CommandRecognitionBackend;
pub use translator::CommandTranslationBackend;

/// Build every configured recognition engine, in configured order
pub fn recognition_backends(config: &RecognitionConfig) -> Vec<Arc<dyn RecognitionBackend>> {
    config
        .engines
        .iter()
        .map(|engine| {
            Arc::new(CommandRecognitionBackend::from_config(
                engine,
                config.confidence_threshold,
                &config.languages,
            )) as Arc<dyn RecognitionBackend>
        })
        .collect()
}

/// Build every configured translation engine, in configured order
pub fn translation_backends(config: &TranslationConfig) -> Vec<Arc<dyn TranslationBackend>> {
    config
        .engines
        .iter()
        .map(|engine| Arc::new(CommandTranslationBackend::from_config(engine)) as Arc<dyn TranslationBackend>)
        .collect()
}

/// Resolve a command to an executable path. Commands containing a path
/// separator are checked as-is; bare names are searched on `PATH`.
pub fn resolve_command(command: &str) -> Option<PathBuf> {
    let candidate = Path::new(command);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    let found = std::env::split_paths(&path_var)
        .flat_map(|dir| executable_names(command).into_iter().map(move |name| dir.join(name)))
        .find(|path| path.is_file());

    if found.is_none() {
        debug!("Command '{}' not found on PATH", command);
    }
    found
}

#[cfg(windows)]
fn executable_names(command: &str) -> Vec<String> {
    vec![command.to_string(), format!("{}.exe", command)]
}

#[cfg(not(windows))]
fn executable_names(command: &str) -> Vec<String> {
    vec![command.to_string()]
}

/// Await a child process under a deadline; non-zero exit is an error
async fn finish<F>(name: &str, timeout_secs: u64, output: F) -> Result<Output, EngineError>
where
    F: std::future::Future<Output = std::io::Result<Output>>,
{
    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), output)
        .await
        .map_err(|_| EngineError::Timeout(timeout_secs))??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(EngineError::Failed(format!(
            "{} exited with {}: {}",
            name,
            output.status,
            stderr.trim()
        )));
    }

    Ok(output)
}
