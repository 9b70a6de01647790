//! End-to-end behaviour of the capture → recognize → translate pipeline,
//! driven by scripted capture sources and in-process engines.

use image::{Rgb, RgbImage};
use live_translator::{
    control_channel, CaptureSource, Controller, EngineError, Frame, FrameSource, GlossaryStore,
    LoopSettings, MonitorTarget, Pipeline, PipelineSettings, Rect, RecognitionBackend,
    RecognitionGateway, RecognizedRegion, TranslatedRegion, TranslationBackend, TranslationBatch,
    TranslationGateway, WindowId,
};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Serves a solid frame whose brightness the test controls
struct PanelSource {
    level: AtomicU8,
}

impl PanelSource {
    fn new(level: u8) -> Arc<Self> {
        Arc::new(Self {
            level: AtomicU8::new(level),
        })
    }

    fn frame(&self) -> Frame {
        let level = self.level.load(Ordering::SeqCst);
        Frame::from_rgb_image(RgbImage::from_pixel(128, 128, Rgb([level; 3])), FrameSource::FullScreen)
    }
}

impl CaptureSource for PanelSource {
    fn capture_full_screen(&self) -> Frame {
        self.frame()
    }
    fn capture_window(&self, _id: WindowId, _bounds: &Rect) -> Frame {
        self.frame()
    }
    fn capture_region(&self, _rect: &Rect, _name: &str) -> Frame {
        self.frame()
    }
    fn screen_dimensions(&self) -> (u32, u32) {
        (128, 128)
    }
}

/// Reports fixed text and counts invocations
struct CountingOcr {
    name: &'static str,
    available: bool,
    texts: Vec<&'static str>,
    calls: AtomicUsize,
}

impl CountingOcr {
    fn new(name: &'static str, available: bool, texts: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            name,
            available,
            texts,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait::async_trait]
impl RecognitionBackend for CountingOcr {
    fn name(&self) -> &str {
        self.name
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn detect_text(&self, _frame: &Frame) -> Result<Vec<RecognizedRegion>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .texts
            .iter()
            .enumerate()
            .map(|(i, text)| RecognizedRegion::new(*text, Rect::new(0, i as i32 * 30, 120, 24), 0.9))
            .collect())
    }
}

/// Prefixes text with the engine name
struct TaggingTranslator {
    name: &'static str,
    available: bool,
}

#[async_trait::async_trait]
impl TranslationBackend for TaggingTranslator {
    fn name(&self) -> &str {
        self.name
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<TranslatedRegion, EngineError> {
        Ok(TranslatedRegion {
            original_text: text.to_string(),
            translated_text: format!("{}:{}", self.name, text),
            confidence: 0.8,
            source_lang: source.to_string(),
            target_lang: target.to_string(),
            glossary_hit: false,
            matched_category: None,
        })
    }
}

fn ocr_engines(engines: &[&Arc<CountingOcr>]) -> Vec<Arc<dyn RecognitionBackend>> {
    engines
        .iter()
        .map(|e| Arc::clone(e) as Arc<dyn RecognitionBackend>)
        .collect()
}

fn translator(name: &'static str, available: bool) -> Arc<dyn TranslationBackend> {
    Arc::new(TaggingTranslator { name, available })
}

fn fast_settings() -> LoopSettings {
    LoopSettings {
        frame_interval: Duration::from_millis(5),
        poll_interval: Duration::from_millis(2),
        retry_backoff: Duration::from_millis(5),
        stop_timeout: Duration::from_secs(2),
        ..LoopSettings::default()
    }
}

fn glossary() -> Arc<GlossaryStore> {
    Arc::new(GlossaryStore::open_in_memory().unwrap())
}

fn blank_frame() -> Frame {
    Frame::from_rgb_image(RgbImage::new(128, 128), FrameSource::FullScreen)
}

#[tokio::test]
async fn glossary_term_translates_without_backend() {
    let store = glossary();
    store.add_term("启动", "Start", "automation", 1.0);
    let gateway = TranslationGateway::new(Vec::new(), "google", Some(store));

    let result = gateway.translate("启动", "auto", "en", true).await;
    assert_eq!(result.translated_text, "Start");
    assert!(result.glossary_hit);
}

#[tokio::test]
async fn glossary_outranks_available_backend() {
    let store = glossary();
    store.add_term("急停", "E-Stop", "safety", 1.0);
    let gateway = TranslationGateway::new(
        vec![translator("google", true)],
        "google",
        Some(store),
    );

    let result = gateway.translate("急停", "zh", "en", true).await;
    assert_eq!(result.translated_text, "E-Stop");
    assert_eq!(result.matched_category.as_deref(), Some("safety"));
}

#[tokio::test]
async fn no_recognition_backend_yields_no_regions() {
    let gateway = RecognitionGateway::new(Vec::new(), "paddleocr");
    assert!(gateway.detect_text(&blank_frame(), None).await.is_empty());

    let unavailable = RecognitionGateway::new(
        ocr_engines(&[&CountingOcr::new("paddleocr", false, vec!["报警"])]),
        "paddleocr",
    );
    assert!(unavailable.detect_text(&blank_frame(), None).await.is_empty());
}

#[tokio::test]
async fn fallback_engines_still_answer() {
    let recognition = RecognitionGateway::new(
        ocr_engines(&[
            &CountingOcr::new("paddleocr", false, vec![]),
            &CountingOcr::new("tesseract", true, vec!["报警"]),
        ]),
        "paddleocr",
    );
    assert_eq!(recognition.detect_text(&blank_frame(), None).await.len(), 1);

    let translation = TranslationGateway::new(
        vec![translator("google", false), translator("offline", true)],
        "google",
        None,
    );
    let result = translation.translate("未知词汇", "zh", "en", true).await;
    assert_eq!(result.translated_text, "offline:未知词汇");
}

#[tokio::test]
async fn identical_frames_recognized_once() {
    let ocr = CountingOcr::new("paddleocr", true, vec!["报警", "速度"]);
    let pipeline = Arc::new(Pipeline::new(
        Arc::new(RecognitionGateway::new(ocr_engines(&[&ocr]), "paddleocr")),
        Arc::new(TranslationGateway::new(Vec::new(), "google", Some(glossary()))),
        PipelineSettings::default(),
    ));

    let source = PanelSource::new(120);
    let mut controller = Controller::new(
        source.clone() as Arc<dyn CaptureSource>,
        fast_settings(),
        pipeline.clone(),
        MonitorTarget::FullScreen,
    );

    assert!(controller.start());
    tokio::time::sleep(Duration::from_millis(120)).await;

    assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
    let detected = controller.status().texts_detected;
    assert_eq!(detected, 2);

    // Still unchanged: counters hold
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(controller.status().texts_detected, detected);

    // A visual change is picked up
    source.level.store(10, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(ocr.calls.load(Ordering::SeqCst), 2);

    controller.stop().await.unwrap();
}

#[tokio::test]
async fn batch_skips_blank_entries() {
    let gateway = TranslationGateway::new(Vec::new(), "google", Some(glossary()));
    let results = gateway
        .translate_batch(&["启动", "", "未知词汇"], "zh", "en", true)
        .await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].translated_text, "Start");
    assert!(results[0].glossary_hit);
    assert_eq!(results[1].translated_text, "未知词汇");
    assert_eq!(results[1].confidence, 0.0);
}

#[test]
fn duplicate_add_keeps_one_entry() {
    let store = GlossaryStore::open_in_memory_unseeded().unwrap();
    assert!(store.add_term("测试", "Test", "custom", 1.0));
    assert!(store.add_term("测试", "Test", "custom", 1.0));

    let entries = store.entries_for("测试").unwrap();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn consumer_sees_only_useful_pairs() {
    let batches: Arc<Mutex<Vec<TranslationBatch>>> = Arc::default();
    let sink = Arc::clone(&batches);

    let pipeline = Pipeline::new(
        Arc::new(RecognitionGateway::new(
            ocr_engines(&[&CountingOcr::new("paddleocr", true, vec!["停止", "未知词汇", "好"])]),
            "paddleocr",
        )),
        Arc::new(TranslationGateway::new(Vec::new(), "google", Some(glossary()))),
        PipelineSettings::default(),
    )
    .with_consumer(Arc::new(move |batch: &TranslationBatch| {
        sink.lock().unwrap().push(batch.clone());
    }));

    pipeline.process_frame(&blank_frame()).await;

    let batches = batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    let batch = &batches[0];
    assert_eq!(batch.recognized.len(), batch.translated.len());
    assert_eq!(batch.recognized[0].text, "停止");
    assert_eq!(batch.translated[0].translated_text, "Stop");
    assert_eq!(pipeline.counters().texts_detected(), 2);
    assert_eq!(pipeline.counters().texts_translated(), 1);
}

#[tokio::test]
async fn counters_reset_per_session() {
    let pipeline = Arc::new(Pipeline::new(
        Arc::new(RecognitionGateway::new(
            ocr_engines(&[&CountingOcr::new("paddleocr", true, vec!["报警"])]),
            "paddleocr",
        )),
        Arc::new(TranslationGateway::new(Vec::new(), "google", Some(glossary()))),
        PipelineSettings::default(),
    ));
    let mut controller = Controller::new(
        PanelSource::new(200),
        fast_settings(),
        pipeline,
        MonitorTarget::FullScreen,
    );

    controller.start();
    tokio::time::sleep(Duration::from_millis(60)).await;
    controller.stop().await.unwrap();
    assert_eq!(controller.status().texts_translated, 1);

    controller.start();
    tokio::time::sleep(Duration::from_millis(60)).await;
    let status = controller.status();
    assert_eq!(status.sessions_started, 2);
    assert_eq!(status.texts_translated, 1);
    controller.stop().await.unwrap();
}

#[tokio::test]
async fn command_queue_drives_controller() {
    let pipeline = Arc::new(Pipeline::new(
        Arc::new(RecognitionGateway::new(
            ocr_engines(&[&CountingOcr::new("paddleocr", true, vec!["报警"])]),
            "paddleocr",
        )),
        Arc::new(TranslationGateway::new(Vec::new(), "google", Some(glossary()))),
        PipelineSettings::default(),
    ));
    let controller = Controller::new(
        PanelSource::new(64),
        fast_settings(),
        pipeline,
        MonitorTarget::FullScreen,
    );

    let (handle, rx) = control_channel(4);
    let worker = tokio::spawn(controller.run(rx));

    handle.toggle().await.unwrap();
    handle.start().await.unwrap();
    let region = MonitorTarget::Region {
        rect: Rect::new(0, 0, 48, 48),
        name: "alarm bar".into(),
    };
    handle.select_target(region.clone()).await.unwrap();

    let status = handle.status().await.unwrap();
    assert!(status.running);
    assert_eq!(status.target, region);
    assert_eq!(status.sessions_started, 2);

    let once = handle.capture_once().await.unwrap().unwrap();
    assert_eq!(once.translated[0].translated_text, "Alarm");

    handle.shutdown().await.unwrap();
    assert!(!worker.await.unwrap().running);
}
