//! Change-gated capture loop.
//!
//! The loop runs on its own tokio task. Each iteration waits for the frame
//! interval, acquires a frame off the executor, fingerprints it, and hands
//! changed frames to a [`FrameSink`]. The sink runs inline on the loop task,
//! so at most one frame is in flight.
//!
//! Stopping lets the current iteration finish: only the waits between
//! iterations observe the stop signal. A sink call that outlives the stop
//! timeout is aborted.

use crate::capture::CaptureSource;
use crate::change_detector::{hash_to_hex, Fingerprint, FrameGate, Fingerprinter};
use crate::config::CaptureConfig;
use crate::controller::ControlError;
use crate::frame::Frame;
use crate::types::{CaptureError, MonitorTarget};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn, Instrument};

/// Receives every frame whose fingerprint changed
#[async_trait::async_trait]
pub trait FrameSink: Send + Sync {
    async fn on_frame(&self, frame: Frame);
}

#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub frame_interval: Duration,
    pub poll_interval: Duration,
    pub retry_backoff: Duration,
    pub stop_timeout: Duration,
    pub fingerprinter: Fingerprinter,
}

impl From<&CaptureConfig> for LoopSettings {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            frame_interval: config.frame_interval(),
            poll_interval: config.poll_interval(),
            retry_backoff: config.retry_backoff(),
            stop_timeout: config.stop_timeout(),
            fingerprinter: Fingerprinter::new(config.fingerprint, config.hash_size),
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from(&CaptureConfig::default())
    }
}

/// Per-session frame counters
#[derive(Debug, Default)]
pub struct LoopStats {
    pub captured: AtomicU64,
    pub accepted: AtomicU64,
    pub unchanged: AtomicU64,
    pub failures: AtomicU64,
}

impl LoopStats {
    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.captured.load(Ordering::Relaxed),
            self.accepted.load(Ordering::Relaxed),
            self.unchanged.load(Ordering::Relaxed),
            self.failures.load(Ordering::Relaxed),
        )
    }
}

pub struct CaptureLoop {
    source: Arc<dyn CaptureSource>,
    settings: LoopSettings,
    handle: Option<JoinHandle<()>>,
    stop_tx: Option<watch::Sender<bool>>,
    stats: Arc<LoopStats>,
}

impl CaptureLoop {
    pub fn new(source: Arc<dyn CaptureSource>, settings: LoopSettings) -> Self {
        Self {
            source,
            settings,
            handle: None,
            stop_tx: None,
            stats: Arc::new(LoopStats::default()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn stats(&self) -> Arc<LoopStats> {
        Arc::clone(&self.stats)
    }

    pub fn source(&self) -> Arc<dyn CaptureSource> {
        Arc::clone(&self.source)
    }

    /// Spawn the worker. A loop that is already running is left alone and
    /// `AlreadyRunning` is returned.
    pub fn start(
        &mut self,
        target: MonitorTarget,
        sink: Arc<dyn FrameSink>,
        span: tracing::Span,
    ) -> Result<(), ControlError> {
        if self.is_running() {
            return Err(ControlError::AlreadyRunning);
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        self.stats = Arc::new(LoopStats::default());

        let worker = run_loop(
            target,
            Arc::clone(&self.source),
            sink,
            self.settings,
            Arc::clone(&self.stats),
            stop_rx,
        );

        self.handle = Some(tokio::spawn(worker.instrument(span)));
        self.stop_tx = Some(stop_tx);
        Ok(())
    }

    /// Signal the worker and wait, bounded by the stop timeout, for it to exit
    pub async fn stop(&mut self) -> Result<(), ControlError> {
        let mut handle = match self.handle.take() {
            Some(handle) => handle,
            None => return Err(ControlError::NotRunning),
        };

        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(true);
        }

        match tokio::time::timeout(self.settings.stop_timeout, &mut handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                warn!("Capture worker ended abnormally: {}", e);
                Ok(())
            }
            Err(_) => {
                warn!(
                    "Capture worker did not exit within {:?}, aborting",
                    self.settings.stop_timeout
                );
                handle.abort();
                Err(ControlError::StopTimeout(self.settings.stop_timeout))
            }
        }
    }
}

/// Sleep for `duration` unless stopped first; returns whether to stop
async fn sleep_or_stop(stop_rx: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => *stop_rx.borrow(),
        changed = stop_rx.changed() => changed.is_err() || *stop_rx.borrow(),
    }
}

/// Capture and fingerprint one frame; `None` for an empty capture
fn acquire(
    source: &dyn CaptureSource,
    target: &MonitorTarget,
    fingerprinter: Fingerprinter,
) -> Result<Option<(Frame, Fingerprint)>, CaptureError> {
    let frame = source.capture(target);
    if frame.is_empty() {
        return Ok(None);
    }
    let fingerprint = fingerprinter.fingerprint(&frame)?;
    Ok(Some((frame, fingerprint)))
}

async fn run_loop(
    mut target: MonitorTarget,
    source: Arc<dyn CaptureSource>,
    sink: Arc<dyn FrameSink>,
    settings: LoopSettings,
    stats: Arc<LoopStats>,
    mut stop_rx: watch::Receiver<bool>,
) {
    info!("Capture loop started on {} at {:?} per frame", target.describe(), settings.frame_interval);

    let mut gate = FrameGate::new();
    let mut last_accepted: Option<Instant> = None;

    loop {
        if *stop_rx.borrow() {
            break;
        }

        if let Some(accepted_at) = last_accepted {
            let elapsed = accepted_at.elapsed();
            if elapsed < settings.frame_interval {
                let wait = settings.poll_interval.min(settings.frame_interval - elapsed);
                if sleep_or_stop(&mut stop_rx, wait).await {
                    break;
                }
                continue;
            }
        }

        let joined = tokio::task::spawn_blocking({
            let source = Arc::clone(&source);
            let mut target = target.clone();
            let fingerprinter = settings.fingerprinter;
            move || {
                if !source.refresh_target(&mut target) {
                    trace!("{} not listed, using last-known bounds", target.describe());
                }
                let acquired = acquire(source.as_ref(), &target, fingerprinter);
                (target, acquired)
            }
        })
        .await;

        let acquired = match joined {
            Ok((refreshed, acquired)) => {
                target = refreshed;
                acquired
            }
            Err(e) => Err(CaptureError::Worker(e.to_string())),
        };

        let pause = match acquired {
            Ok(Some((frame, fingerprint))) => {
                stats.captured.fetch_add(1, Ordering::Relaxed);
                if gate.admit(fingerprint) {
                    stats.accepted.fetch_add(1, Ordering::Relaxed);
                    last_accepted = Some(Instant::now());
                    debug!(
                        "Frame {}x{} accepted ({})",
                        frame.width(),
                        frame.height(),
                        hash_to_hex(fingerprint)
                    );
                    sink.on_frame(frame).await;
                    None
                } else {
                    stats.unchanged.fetch_add(1, Ordering::Relaxed);
                    Some(settings.poll_interval)
                }
            }
            Ok(None) => {
                trace!("Empty frame from {}, skipping tick", target.describe());
                Some(settings.poll_interval)
            }
            Err(e) => {
                stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!("Capture failed: {}; retrying in {:?}", e, settings.retry_backoff);
                Some(settings.retry_backoff)
            }
        };

        if let Some(pause) = pause {
            if sleep_or_stop(&mut stop_rx, pause).await {
                break;
            }
        }
    }

    info!("Capture loop stopped");
}
