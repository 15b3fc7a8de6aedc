//! The frame loop.
//!
//! One frame is in flight at a time. Each iteration:
//! 1. pulls a frame (end of stream stops the loop cleanly)
//! 2. runs the detector
//! 3. filters detections against the confidence threshold
//! 4. ticks the alert controller and notifies on a rising edge
//! 5. updates the instantaneous FPS
//! 6. renders boxes, banner and FPS, then presents the frame
//! 7. honours a pending stop request
//!
//! Whatever ends the loop, the source and renderer are released exactly once,
//! including when a collaborator panics and the monitor is dropped while
//! unwinding.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::alert::{AlertController, AlertEvent, AlertState};
use crate::detect::Detector;
use crate::filter::DetectionFilter;
use crate::fps::FpsMeter;
use crate::ingest::FrameSource;
use crate::notify::{DispatchSnapshot, NotificationDispatcher};
use crate::render::{compose_overlays, RenderControl, Renderer};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Shared stop flag. Clones observe the same request.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why the loop ended without an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    Interrupted,
    ViewerQuit,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub stop_reason: StopReason,
    pub frames: u64,
    pub detections_accepted: u64,
    pub alerts_raised: u64,
    pub notifications: DispatchSnapshot,
}

/// Detection and alert parameters for a run.
#[derive(Clone, Debug)]
pub struct MonitorSettings {
    pub class_names: Vec<String>,
    pub confidence_threshold: f32,
    pub alert_duration: Duration,
    pub target_label: String,
}

pub struct Monitor<S: FrameSource, D: Detector, R: Renderer> {
    source: S,
    detector: D,
    renderer: R,
    filter: DetectionFilter,
    alert: AlertController,
    dispatcher: NotificationDispatcher,
    fps: FpsMeter,
    target_label: String,
    stop: StopSignal,
    frames: u64,
    detections_accepted: u64,
    released: bool,
}

impl<S, D, R> Monitor<S, D, R>
where
    S: FrameSource,
    D: Detector,
    R: Renderer,
{
    pub fn new(
        settings: MonitorSettings,
        source: S,
        detector: D,
        renderer: R,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            source,
            detector,
            renderer,
            filter: DetectionFilter::new(settings.class_names, settings.confidence_threshold),
            alert: AlertController::new(settings.alert_duration),
            dispatcher,
            fps: FpsMeter::new(),
            target_label: settings.target_label,
            stop: StopSignal::new(),
            frames: 0,
            detections_accepted: 0,
            released: false,
        }
    }

    /// Use an externally owned stop flag (e.g. one set from a Ctrl-C handler).
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn alert_state(&self) -> AlertState {
        self.alert.state()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Connect the source, loop until it ends, then release everything.
    pub fn run(&mut self) -> Result<RunSummary> {
        let outcome = self.connect_and_loop();
        self.release();
        let stop_reason = outcome?;

        let summary = self.summary(stop_reason);
        log::info!(
            "monitor stopped ({:?}): frames={} accepted={} alerts={} notified={} failed={}",
            summary.stop_reason,
            summary.frames,
            summary.detections_accepted,
            summary.alerts_raised,
            summary.notifications.delivered,
            summary.notifications.failed
        );
        Ok(summary)
    }

    /// Process one frame. `Some(reason)` means the loop should end.
    pub fn step(&mut self) -> Result<Option<StopReason>> {
        let Some(mut frame) = self.source.next_frame().context("frame source failed")? else {
            return Ok(Some(StopReason::EndOfStream));
        };
        self.frames += 1;

        let raw = self.detector.detect(&frame).with_context(|| {
            format!(
                "detector {} failed on frame {}",
                self.detector.name(),
                frame.sequence
            )
        })?;
        let accepted = self
            .filter
            .apply(&raw)
            .with_context(|| format!("frame {}", frame.sequence))?;
        self.detections_accepted += accepted.len() as u64;

        let target_present = accepted.iter().any(|d| d.label == self.target_label);
        let event = self.alert.tick(frame.captured_at, target_present);
        if event == AlertEvent::Raised {
            log::warn!("Threat: {} detected on frame {}!", self.target_label, frame.sequence);
            log::warn!("Recommendation: Use chemical treatments or biological control.");
            self.dispatcher.dispatch();
        }

        let fps = self.fps.record(frame.captured_at);
        if let Some(fps) = fps {
            log::debug!("frame {}: {:.2} fps", frame.sequence, fps);
        }

        for overlay in compose_overlays(&accepted, event.shows_banner(), fps) {
            self.renderer.draw(&mut frame, &overlay)?;
        }
        if self.renderer.present(&frame)? == RenderControl::Quit {
            return Ok(Some(StopReason::ViewerQuit));
        }
        Ok(None)
    }

    fn connect_and_loop(&mut self) -> Result<StopReason> {
        self.source.connect().context("connect frame source")?;
        self.detector.warm_up().context("detector warm-up")?;
        log::info!(
            "monitoring for '{}' (threshold {:.2}, alert {:?}, detector {}, renderer {})",
            self.target_label,
            self.filter.threshold(),
            self.alert.duration(),
            self.detector.name(),
            self.renderer.name()
        );

        let mut last_health_log = Instant::now();
        loop {
            if let Some(reason) = self.step()? {
                return Ok(reason);
            }
            if self.stop.is_requested() {
                return Ok(StopReason::Interrupted);
            }
            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                let stats = self.source.stats();
                log::info!(
                    "source={} frames={} accepted={} alerts={} fps={}",
                    stats.source,
                    stats.frames_captured,
                    self.detections_accepted,
                    self.alert.episodes(),
                    self.fps
                        .current()
                        .map(|fps| format!("{:.2}", fps))
                        .unwrap_or_else(|| "-".into())
                );
                last_health_log = Instant::now();
            }
        }
    }

    /// Release the source, renderer and notification worker. Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.source.release();
        self.renderer.release();
        self.dispatcher.shutdown();
    }

    fn summary(&self, stop_reason: StopReason) -> RunSummary {
        RunSummary {
            stop_reason,
            frames: self.frames,
            detections_accepted: self.detections_accepted,
            alerts_raised: self.alert.episodes(),
            notifications: self.dispatcher.stats(),
        }
    }
}

impl<S: FrameSource, D: Detector, R: Renderer> Drop for Monitor<S, D, R> {
    fn drop(&mut self) {
        self.release();
    }
}
