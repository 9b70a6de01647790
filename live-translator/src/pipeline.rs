//! Pipeline coordinator.
//!
//! Turns an accepted frame into a batch of (recognized, translated) pairs:
//! recognize, drop noise, translate each surviving region individually so
//! pairing by index always holds, keep the pairs worth showing, and hand the
//! batch to the registered consumer.

use crate::capture_loop::FrameSink;
use crate::config::Config;
use crate::frame::Frame;
use crate::preprocess::{rescale_regions, Prepared, Preprocessor};
use crate::recognition::{filter_noise, RecognitionGateway};
use crate::translation::TranslationGateway;
use crate::types::{RecognizedRegion, TranslatedRegion};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Pairs at or below this confidence are not emitted
pub const EMIT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Paired results for one frame. Both lists have the same length.
#[derive(Debug, Clone, Serialize)]
pub struct TranslationBatch {
    pub recognized: Vec<RecognizedRegion>,
    pub translated: Vec<TranslatedRegion>,
    pub captured_at: DateTime<Utc>,
}

impl TranslationBatch {
    pub fn len(&self) -> usize {
        self.translated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.translated.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&RecognizedRegion, &TranslatedRegion)> {
        self.recognized.iter().zip(self.translated.iter())
    }
}

/// Called on the capture worker for every non-empty batch; must not block
pub type BatchConsumer = Arc<dyn Fn(&TranslationBatch) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub min_text_height: u32,
    pub source_lang: String,
    pub target_lang: String,
    pub use_glossary: bool,
    /// Recognition engine to use instead of the primary
    pub engine_override: Option<String>,
    /// Clean-up applied before recognition; `None` sends raw frames
    pub preprocess: Option<Preprocessor>,
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            min_text_height: config.recognition.min_text_height,
            source_lang: config.translation.source_lang.clone(),
            target_lang: config.translation.target_lang.clone(),
            use_glossary: config.translation.use_glossary,
            engine_override: None,
            preprocess: config
                .recognition
                .preprocess
                .enabled
                .then(|| Preprocessor::from(&config.recognition.preprocess)),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Running totals for the current session
#[derive(Debug, Default)]
pub struct PipelineCounters {
    texts_detected: AtomicU64,
    texts_translated: AtomicU64,
}

impl PipelineCounters {
    pub fn texts_detected(&self) -> u64 {
        self.texts_detected.load(Ordering::Relaxed)
    }

    pub fn texts_translated(&self) -> u64 {
        self.texts_translated.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.texts_detected.store(0, Ordering::Relaxed);
        self.texts_translated.store(0, Ordering::Relaxed);
    }
}

pub struct Pipeline {
    recognition: Arc<RecognitionGateway>,
    translation: Arc<TranslationGateway>,
    settings: PipelineSettings,
    counters: PipelineCounters,
    consumer: Option<BatchConsumer>,
}

impl Pipeline {
    pub fn new(
        recognition: Arc<RecognitionGateway>,
        translation: Arc<TranslationGateway>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            recognition,
            translation,
            settings,
            counters: PipelineCounters::default(),
            consumer: None,
        }
    }

    pub fn with_consumer(mut self, consumer: BatchConsumer) -> Self {
        self.consumer = Some(consumer);
        self
    }

    pub fn counters(&self) -> &PipelineCounters {
        &self.counters
    }

    pub fn recognition(&self) -> &RecognitionGateway {
        &self.recognition
    }

    pub fn translation(&self) -> &TranslationGateway {
        &self.translation
    }

    /// Run one frame through recognition and translation. Returns the
    /// emitted batch, or `None` when nothing was worth showing.
    pub async fn process_frame(&self, frame: &Frame) -> Option<TranslationBatch> {
        let prepared = self.prepare(frame).await;
        let (input, scale) = match &prepared {
            Some(prepared) => (&prepared.frame, prepared.scale),
            None => (frame, 1),
        };

        let regions = self
            .recognition
            .detect_text(input, self.settings.engine_override.as_deref())
            .await;
        let regions = filter_noise(rescale_regions(regions, scale), self.settings.min_text_height);
        if regions.is_empty() {
            debug!("No text regions survived filtering");
            return None;
        }

        self.counters
            .texts_detected
            .fetch_add(regions.len() as u64, Ordering::Relaxed);

        let mut recognized = Vec::new();
        let mut translated = Vec::new();
        for region in regions {
            let result = self
                .translation
                .translate(
                    &region.text,
                    &self.settings.source_lang,
                    &self.settings.target_lang,
                    self.settings.use_glossary,
                )
                .await;

            if worth_showing(&result) {
                recognized.push(region);
                translated.push(result);
            }
        }

        if translated.is_empty() {
            debug!("No translations worth showing");
            return None;
        }

        self.counters
            .texts_translated
            .fetch_add(translated.len() as u64, Ordering::Relaxed);

        let batch = TranslationBatch {
            recognized,
            translated,
            captured_at: Utc::now(),
        };

        info!(
            "Emitting {} translations ({} detected / {} translated this session)",
            batch.len(),
            self.counters.texts_detected(),
            self.counters.texts_translated()
        );

        if let Some(consumer) = &self.consumer {
            consumer(&batch);
        }

        Some(batch)
    }
}

impl Pipeline {
    /// Preprocess off the executor. A failure falls back to the raw frame.
    async fn prepare(&self, frame: &Frame) -> Option<Prepared> {
        let preprocessor = self.settings.preprocess?;
        let frame = frame.clone();
        match tokio::task::spawn_blocking(move || preprocessor.apply(&frame)).await {
            Ok(Ok(prepared)) => Some(prepared),
            Ok(Err(e)) => {
                warn!("Preprocessing failed, recognizing the raw frame: {}", e);
                None
            }
            Err(e) => {
                warn!("Preprocessing worker failed: {}", e);
                None
            }
        }
    }
}

/// A translation is shown only if it differs from the source and is
/// confident enough
pub fn worth_showing(result: &TranslatedRegion) -> bool {
    !result.is_identity() && result.confidence > EMIT_CONFIDENCE_THRESHOLD
}

#[async_trait::async_trait]
impl FrameSink for Pipeline {
    async fn on_frame(&self, frame: Frame) {
        self.process_frame(&frame).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameSource;
    use crate::recognition::RecognitionBackend;
    use crate::translation::TranslationBackend;
    use crate::types::{EngineError, Rect};
    use glossary_store::GlossaryStore;
    use std::sync::Mutex;

    struct FixedRegions(Vec<RecognizedRegion>);

    #[async_trait::async_trait]
    impl RecognitionBackend for FixedRegions {
        fn name(&self) -> &str {
            "fixed"
        }
        fn is_available(&self) -> bool {
            true
        }
        async fn detect_text(&self, _frame: &Frame) -> Result<Vec<RecognizedRegion>, EngineError> {
            Ok(self.0.clone())
        }
    }

    /// Returns "<text>!" with a confidence encoded in the table
    struct ScoredTranslator(Vec<(&'static str, f32)>);

    #[async_trait::async_trait]
    impl TranslationBackend for ScoredTranslator {
        fn name(&self) -> &str {
            "scored"
        }
        fn is_available(&self) -> bool {
            true
        }
        async fn translate(&self, text: &str, s: &str, t: &str) -> Result<TranslatedRegion, EngineError> {
            let confidence = self
                .0
                .iter()
                .find(|(k, _)| *k == text)
                .map(|(_, c)| *c)
                .ok_or_else(|| EngineError::Failed("unknown".into()))?;
            Ok(TranslatedRegion {
                original_text: text.into(),
                translated_text: format!("{}!", text),
                confidence,
                source_lang: s.into(),
                target_lang: t.into(),
                glossary_hit: false,
                matched_category: None,
            })
        }
    }

    fn region(text: &str, height: u32) -> RecognizedRegion {
        RecognizedRegion::new(text, Rect::new(0, 0, 80, height), 0.9)
    }

    fn frame() -> Frame {
        Frame::from_rgb_image(image::RgbImage::new(128, 128), FrameSource::FullScreen)
    }

    fn pipeline(regions: Vec<RecognizedRegion>, scores: Vec<(&'static str, f32)>) -> Pipeline {
        let recognition = RecognitionGateway::new(
            vec![Arc::new(FixedRegions(regions)) as Arc<dyn RecognitionBackend>],
            "fixed",
        );
        let glossary = Arc::new(GlossaryStore::open_in_memory().unwrap());
        let translation =
            TranslationGateway::new(
            vec![Arc::new(ScoredTranslator(scores)) as Arc<dyn TranslationBackend>],
            "scored",
            Some(glossary),
        );
        Pipeline::new(Arc::new(recognition), Arc::new(translation), PipelineSettings::default())
    }

    #[tokio::test]
    async fn test_emission_filter() {
        let p = pipeline(
            vec![
                region("启动", 20),
                region("half", 20),
                region("sure", 20),
                region("fails", 20),
                region("x", 20),
                region("short", 4),
            ],
            vec![("half", 0.5), ("sure", 0.51)],
        );

        let batch = p.process_frame(&frame()).await.unwrap();
        let texts: Vec<_> = batch.translated.iter().map(|t| t.translated_text.as_str()).collect();
        assert_eq!(texts, vec!["Start", "sure!"]);
        assert_eq!(batch.recognized.len(), batch.translated.len());
        for (rec, tr) in batch.pairs() {
            assert_eq!(rec.text, tr.original_text);
        }

        assert_eq!(p.counters().texts_detected(), 4);
        assert_eq!(p.counters().texts_translated(), 2);
    }

    #[tokio::test]
    async fn test_nothing_to_emit() {
        let p = pipeline(vec![region("未知词汇", 20)], vec![]);
        assert!(p.process_frame(&frame()).await.is_none());
        assert_eq!(p.counters().texts_detected(), 1);
        assert_eq!(p.counters().texts_translated(), 0);

        p.counters().reset();
        assert_eq!(p.counters().texts_detected(), 0);
    }

    #[tokio::test]
    async fn test_consumer_receives_batches() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let p = pipeline(vec![region("停止", 20)], vec![]).with_consumer(Arc::new(
            move |batch: &TranslationBatch| {
                sink.lock().unwrap().push(batch.translated[0].translated_text.clone());
            },
        ));

        p.on_frame(frame()).await;
        assert_eq!(seen.lock().unwrap().as_slice(), ["Stop".to_string()]);
    }

    /// Reports one region covering whatever frame it receives
    #[derive(Default)]
    struct WholeFrameReader {
        seen: Mutex<Vec<(u32, u32)>>,
    }

    #[async_trait::async_trait]
    impl RecognitionBackend for WholeFrameReader {
        fn name(&self) -> &str {
            "whole-frame"
        }
        fn is_available(&self) -> bool {
            true
        }
        async fn detect_text(&self, frame: &Frame) -> Result<Vec<RecognizedRegion>, EngineError> {
            self.seen.lock().unwrap().push((frame.width(), frame.height()));
            Ok(vec![RecognizedRegion::new(
                "停止",
                Rect::new(0, 0, frame.width(), frame.height()),
                0.9,
            )])
        }
    }

    fn whole_frame_pipeline(reader: Arc<WholeFrameReader>, settings: PipelineSettings) -> Pipeline {
        let recognition =
            RecognitionGateway::new(vec![reader as Arc<dyn RecognitionBackend>], "whole-frame");
        let glossary = Arc::new(GlossaryStore::open_in_memory().unwrap());
        let translation = TranslationGateway::new(Vec::new(), "none", Some(glossary));
        Pipeline::new(Arc::new(recognition), Arc::new(translation), settings)
    }

    #[tokio::test]
    async fn test_small_frames_are_enlarged_for_recognition() {
        let reader = Arc::new(WholeFrameReader::default());
        let p = whole_frame_pipeline(reader.clone(), PipelineSettings::default());
        let small = Frame::from_rgb_image(image::RgbImage::new(40, 30), FrameSource::FullScreen);

        let batch = p.process_frame(&small).await.unwrap();
        assert_eq!(reader.seen.lock().unwrap().as_slice(), [(120, 90)]);
        assert_eq!(batch.recognized[0].bbox, Rect::new(0, 0, 40, 30));
    }

    #[tokio::test]
    async fn test_preprocessing_can_be_disabled() {
        let reader = Arc::new(WholeFrameReader::default());
        let settings = PipelineSettings {
            preprocess: None,
            ..PipelineSettings::default()
        };
        let p = whole_frame_pipeline(reader.clone(), settings);
        let small = Frame::from_rgb_image(image::RgbImage::new(40, 30), FrameSource::FullScreen);

        p.process_frame(&small).await.unwrap();
        assert_eq!(reader.seen.lock().unwrap().as_slice(), [(40, 30)]);
    }

    #[tokio::test]
    async fn test_batch_serializes_capture_time() {
        let p = pipeline(vec![region("停止", 20)], vec![]);
        let batch = p.process_frame(&frame()).await.unwrap();
        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["translated"][0]["translated_text"], "Stop");
        assert!(json["captured_at"].as_str().is_some_and(|ts| ts.ends_with('Z')));
    }
}
