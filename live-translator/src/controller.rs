//! Session controller.
//!
//! The controller owns the capture loop and the pipeline and is the only
//! thing that starts, stops or retargets them. External event sources (CLI,
//! signals, hotkeys) talk to it through a [`ControlHandle`], which queues
//! [`ControlCommand`]s onto a single task running [`Controller::run`].

use crate::capture::CaptureSource;
use crate::capture_loop::{CaptureLoop, FrameSink, LoopSettings};
use crate::pipeline::{Pipeline, TranslationBatch};
use crate::profiles::Profile;
use crate::types::{CaptureError, MonitorTarget, WindowInfo};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("A capture session is already running")]
    AlreadyRunning,

    #[error("No capture session is running")]
    NotRunning,

    #[error("Capture worker did not stop within {0:?}")]
    StopTimeout(Duration),

    #[error("Controller command queue is closed")]
    QueueClosed,

    #[error("Capture failed: {0}")]
    Capture(#[from] CaptureError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub running: bool,
    pub target: MonitorTarget,
    pub texts_detected: u64,
    pub texts_translated: u64,
    pub sessions_started: u64,
    pub recognition_engine: Option<String>,
    pub translation_engine: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

pub struct Controller {
    capture_loop: CaptureLoop,
    pipeline: Arc<Pipeline>,
    target: MonitorTarget,
    sessions_started: u64,
    started_at: Option<DateTime<Utc>>,
    degraded_reported: bool,
}

impl Controller {
    pub fn new(
        source: Arc<dyn CaptureSource>,
        settings: LoopSettings,
        pipeline: Arc<Pipeline>,
        target: MonitorTarget,
    ) -> Self {
        Self {
            capture_loop: CaptureLoop::new(source, settings),
            pipeline,
            target,
            sessions_started: 0,
            started_at: None,
            degraded_reported: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.capture_loop.is_running()
    }

    pub fn target(&self) -> &MonitorTarget {
        &self.target
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Start a session on the current target. Returns `false` (and warns)
    /// when a session is already running.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            warn!("Capture session already running on {}, ignoring start", self.target.describe());
            return false;
        }

        self.report_degraded_once();
        self.pipeline.counters().reset();

        let session_id = self.sessions_started + 1;
        let span = tracing::info_span!("session", id = session_id, target = %self.target.describe());
        let sink: Arc<dyn FrameSink> = self.pipeline.clone();

        match self.capture_loop.start(self.target.clone(), sink, span) {
            Ok(()) => {
                self.sessions_started = session_id;
                self.started_at = Some(Utc::now());
                info!("Session {} started on {}", session_id, self.target.describe());
                true
            }
            Err(e) => {
                warn!("Could not start session: {}", e);
                false
            }
        }
    }

    /// Stop the running session and wait for the worker to exit
    pub async fn stop(&mut self) -> Result<(), ControlError> {
        let result = self.capture_loop.stop().await;
        if result.is_ok() {
            info!(
                "Session {} stopped ({} detected, {} translated)",
                self.sessions_started,
                self.pipeline.counters().texts_detected(),
                self.pipeline.counters().texts_translated()
            );
        }
        self.started_at = None;
        result
    }

    /// Start if idle, stop if running; returns the new running state
    pub async fn toggle(&mut self) -> Result<bool, ControlError> {
        if self.is_running() {
            self.stop().await?;
            Ok(false)
        } else {
            Ok(self.start())
        }
    }

    /// Switch targets. A running session is stopped first and restarted on
    /// the new target.
    pub async fn select_target(&mut self, target: MonitorTarget) -> Result<(), ControlError> {
        let was_running = self.is_running();
        if was_running {
            self.stop().await?;
        }

        info!("Target set to {}", target.describe());
        self.target = target;

        if was_running {
            self.start();
        }
        Ok(())
    }

    /// One capture, recognize and translate pass outside the loop. The
    /// fingerprint gate is not consulted.
    pub async fn capture_once(&self) -> Result<Option<TranslationBatch>, ControlError> {
        let source = self.capture_loop.source();
        let mut target = self.target.clone();
        let frame = tokio::task::spawn_blocking(move || {
            source.refresh_target(&mut target);
            source.capture(&target)
        })
            .await
            .map_err(|e| CaptureError::Worker(e.to_string()))?;

        if frame.is_empty() {
            return Err(CaptureError::EmptyFrame.into());
        }

        Ok(self.pipeline.process_frame(&frame).await)
    }

    /// Visible windows from the capture source
    pub async fn list_windows(&self) -> Result<Vec<WindowInfo>, ControlError> {
        let source = self.capture_loop.source();
        tokio::task::spawn_blocking(move || source.list_windows())
            .await
            .map_err(|e| CaptureError::Worker(e.to_string()).into())
    }

    /// Import a profile's terms under its category and watch the profile's
    /// application window. Without a matching window the first region is
    /// watched instead.
    pub async fn apply_profile(&mut self, profile: &Profile) -> Result<(), ControlError> {
        if let Some(glossary) = self.pipeline.translation().glossary() {
            let report = glossary.import_mapping(&profile.glossary(), &profile.category);
            info!(
                "Profile '{}': imported {} terms ({} skipped)",
                profile.name, report.imported, report.skipped
            );
        }

        let windows = self.list_windows().await?;
        if let Some(window) = profile.find_window(&windows) {
            info!(
                "Profile '{}' matched window {} ({})",
                profile.name, window.id, window.app_name
            );
            return self.select_target(window.to_target()).await;
        }

        match profile.regions().into_iter().next() {
            Some(region) => self.select_target(region).await,
            None => {
                debug!("Profile '{}': no window or region to watch, keeping target", profile.name);
                Ok(())
            }
        }
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            running: self.is_running(),
            target: self.target.clone(),
            texts_detected: self.pipeline.counters().texts_detected(),
            texts_translated: self.pipeline.counters().texts_translated(),
            sessions_started: self.sessions_started,
            recognition_engine: self.pipeline.recognition().primary_name().map(String::from),
            translation_engine: self.pipeline.translation().primary_name().map(String::from),
            started_at: self.started_at,
        }
    }

    fn report_degraded_once(&mut self) {
        if self.degraded_reported {
            return;
        }
        self.degraded_reported = true;

        if !self.pipeline.recognition().is_available() {
            warn!("Running without a recognition engine: no text will be detected");
        }
        if self.pipeline.translation().primary_name().is_none() {
            warn!("Running without a translation engine: only glossary terms will be translated");
        }
    }

    /// Drain commands until `Shutdown` or until every handle is dropped.
    /// A running session is stopped before returning.
    pub async fn run(mut self, mut rx: mpsc::Receiver<ControlCommand>) -> SessionStatus {
        while let Some(command) = rx.recv().await {
            debug!("Control command: {:?}", command);
            match command {
                ControlCommand::Start => {
                    self.start();
                }
                ControlCommand::Stop => {
                    if let Err(e) = self.stop().await {
                        warn!("Stop failed: {}", e);
                    }
                }
                ControlCommand::Toggle => {
                    if let Err(e) = self.toggle().await {
                        warn!("Toggle failed: {}", e);
                    }
                }
                ControlCommand::SelectTarget(target) => {
                    if let Err(e) = self.select_target(target).await {
                        warn!("Target switch failed: {}", e);
                    }
                }
                ControlCommand::ApplyProfile(profile) => {
                    if let Err(e) = self.apply_profile(&profile).await {
                        warn!("Applying profile '{}' failed: {}", profile.name, e);
                    }
                }
                ControlCommand::CaptureOnce(reply) => {
                    let _ = reply.send(self.capture_once().await);
                }
                ControlCommand::Status(reply) => {
                    let _ = reply.send(self.status());
                }
                ControlCommand::Shutdown => break,
            }
        }

        if self.is_running() {
            if let Err(e) = self.stop().await {
                warn!("Stop on shutdown failed: {}", e);
            }
        }
        self.status()
    }
}

#[derive(Debug)]
pub enum ControlCommand {
    Start,
    Stop,
    Toggle,
    SelectTarget(MonitorTarget),
    ApplyProfile(Box<Profile>),
    CaptureOnce(oneshot::Sender<Result<Option<TranslationBatch>, ControlError>>),
    Status(oneshot::Sender<SessionStatus>),
    Shutdown,
}

/// Cloneable sender side of the controller queue
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<ControlCommand>,
}

/// Create a handle and the receiver to pass to [`Controller::run`]
pub fn control_channel(capacity: usize) -> (ControlHandle, mpsc::Receiver<ControlCommand>) {
    let (tx, rx) = mpsc::channel(capacity);
    (ControlHandle { tx }, rx)
}

impl ControlHandle {
    async fn send(&self, command: ControlCommand) -> Result<(), ControlError> {
        self.tx.send(command).await.map_err(|_| ControlError::QueueClosed)
    }

    pub async fn start(&self) -> Result<(), ControlError> {
        self.send(ControlCommand::Start).await
    }

    pub async fn stop(&self) -> Result<(), ControlError> {
        self.send(ControlCommand::Stop).await
    }

    pub async fn toggle(&self) -> Result<(), ControlError> {
        self.send(ControlCommand::Toggle).await
    }

    pub async fn select_target(&self, target: MonitorTarget) -> Result<(), ControlError> {
        self.send(ControlCommand::SelectTarget(target)).await
    }

    pub async fn apply_profile(&self, profile: Profile) -> Result<(), ControlError> {
        self.send(ControlCommand::ApplyProfile(Box::new(profile))).await
    }

    pub async fn capture_once(&self) -> Result<Option<TranslationBatch>, ControlError> {
        let (reply, rx) = oneshot::channel();
        self.send(ControlCommand::CaptureOnce(reply)).await?;
        rx.await.map_err(|_| ControlError::QueueClosed)?
    }

    pub async fn status(&self) -> Result<SessionStatus, ControlError> {
        let (reply, rx) = oneshot::channel();
        self.send(ControlCommand::Status(reply)).await?;
        rx.await.map_err(|_| ControlError::QueueClosed)
    }

    pub async fn shutdown(&self) -> Result<(), ControlError> {
        self.send(ControlCommand::Shutdown).await
    }
}
