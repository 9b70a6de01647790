//! Translation gateway.
//!
//! The glossary is consulted first and always wins over machine translation.
//! On a miss the primary backend is asked; its output is canonicalized. Any
//! failure produces an identity translation with zero confidence.

use crate::canonicalize::canonicalize;
use crate::types::{EngineError, TranslatedRegion};
use glossary_store::GlossaryStore;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Confidence reported for glossary hits
pub const GLOSSARY_HIT_CONFIDENCE: f32 = 0.95;

/// Confidence reported when no translation was produced
pub const FAILED_TRANSLATION_CONFIDENCE: f32 = 0.0;

/// A machine translation engine
#[async_trait::async_trait]
pub trait TranslationBackend: Send + Sync {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<TranslatedRegion, EngineError>;
}

pub struct TranslationGateway {
    backends: Vec<Arc<dyn TranslationBackend>>,
    primary: Option<usize>,
    glossary: Option<Arc<GlossaryStore>>,
}

impl TranslationGateway {
    pub fn new(
        candidates: Vec<Arc<dyn TranslationBackend>>,
        preferred: &str,
        glossary: Option<Arc<GlossaryStore>>,
    ) -> Self {
        let backends: Vec<_> = candidates
            .into_iter()
            .filter(|backend| {
                let available = backend.is_available();
                if !available {
                    debug!("Translation engine '{}' not available", backend.name());
                }
                available
            })
            .collect();

        let primary = backends
            .iter()
            .position(|b| b.name() == preferred)
            .or(if backends.is_empty() { None } else { Some(0) });

        match primary {
            Some(index) if backends[index].name() == preferred => {
                info!("Translation engine: {}", preferred)
            }
            Some(index) => info!(
                "Preferred translation engine '{}' unavailable, using '{}'",
                preferred,
                backends[index].name()
            ),
            None if glossary.is_some() => {
                warn!("No translation engine available; only glossary terms will be translated")
            }
            None => warn!("No translation engine or glossary available; text passes through untranslated"),
        }

        Self {
            backends,
            primary,
            glossary,
        }
    }

    pub fn primary_name(&self) -> Option<&str> {
        self.primary.map(|i| self.backends[i].name())
    }

    pub fn glossary(&self) -> Option<&Arc<GlossaryStore>> {
        self.glossary.as_ref()
    }

    /// Translate one piece of text, glossary first
    pub async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        use_glossary: bool,
    ) -> TranslatedRegion {
        if use_glossary {
            if let Some(hit) = self.glossary_lookup(text, source_lang, target_lang) {
                return hit;
            }
        }

        let backend = match self.primary {
            Some(index) => &self.backends[index],
            None => return TranslatedRegion::identity(text, source_lang, target_lang),
        };

        match backend.translate(text, source_lang, target_lang).await {
            Ok(result) if !result.translated_text.trim().is_empty() => {
                let translated_text = canonicalize(result.translated_text.trim());
                trace!("{}: '{}' -> '{}'", backend.name(), text, translated_text);
                TranslatedRegion {
                    original_text: text.to_string(),
                    translated_text,
                    confidence: result.confidence,
                    source_lang: result.source_lang,
                    target_lang: target_lang.to_string(),
                    glossary_hit: false,
                    matched_category: None,
                }
            }
            Ok(_) => {
                debug!("{} returned an empty translation for '{}'", backend.name(), text);
                TranslatedRegion::identity(text, source_lang, target_lang)
            }
            Err(e) => {
                warn!("Translation with {} failed: {}", backend.name(), e);
                TranslatedRegion::identity(text, source_lang, target_lang)
            }
        }
    }

    /// Translate each non-blank text in order. Blank inputs produce no
    /// output element, so the result may be shorter than `texts`.
    pub async fn translate_batch<S: AsRef<str>>(
        &self,
        texts: &[S],
        source_lang: &str,
        target_lang: &str,
        use_glossary: bool,
    ) -> Vec<TranslatedRegion> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            let text = text.as_ref();
            if text.trim().is_empty() {
                continue;
            }
            results.push(self.translate(text, source_lang, target_lang, use_glossary).await);
        }
        results
    }

    fn glossary_lookup(&self, text: &str, source_lang: &str, target_lang: &str) -> Option<TranslatedRegion> {
        let glossary = self.glossary.as_ref()?;
        let best = glossary.lookup(text).into_iter().next()?;

        trace!("Glossary hit: '{}' -> '{}'", text, best.target_term);
        Some(TranslatedRegion {
            original_text: text.to_string(),
            translated_text: best.target_term,
            confidence: GLOSSARY_HIT_CONFIDENCE,
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            glossary_hit: true,
            matched_category: Some(best.category),
        })
    }
}
