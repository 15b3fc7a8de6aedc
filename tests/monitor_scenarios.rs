use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use hive_sentinel::detect::ScriptedDetector;
use hive_sentinel::ingest::{SyntheticConfig, SyntheticSource};
use hive_sentinel::notify::DispatchMode;
use hive_sentinel::render::{Overlay, RecordingRenderer, ALERT_BANNER_TEXT};
use hive_sentinel::{
    AlertState, BoundingBox, Detection, Monitor, MonitorSettings, Notification,
    NotificationDispatcher, Notifier, StopReason,
};

const BEE: usize = 0;
const MITE: usize = 1;

#[derive(Clone, Default)]
struct Capture {
    sent: Arc<Mutex<Vec<Notification>>>,
    fail: bool,
}

impl Capture {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Notifier for Capture {
    fn name(&self) -> &'static str {
        "capture"
    }

    fn send(&self, notification: &Notification) -> Result<String> {
        self.sent.lock().unwrap().push(notification.clone());
        if self.fail {
            return Err(anyhow!("gateway unreachable"));
        }
        Ok("SM0001".to_string())
    }
}

fn settings(alert: Duration) -> MonitorSettings {
    MonitorSettings {
        class_names: vec!["Bee".into(), "Mite".into(), "pollen".into()],
        confidence_threshold: 0.5,
        alert_duration: alert,
        target_label: "Mite".into(),
    }
}

fn clocked_source(frames: u64, start: Instant, step: Duration) -> SyntheticSource {
    SyntheticSource::new(SyntheticConfig {
        frame_limit: Some(frames),
        ..SyntheticConfig::default()
    })
    .with_fixed_step(start, step)
}

fn mite(confidence: f32) -> Detection {
    Detection::new(MITE, confidence, BoundingBox::from_corners(10, 60, 30, 80))
}

fn inline(capture: &Capture) -> NotificationDispatcher {
    NotificationDispatcher::new(
        Box::new(capture.clone()),
        Notification::advisory(),
        DispatchMode::Inline,
    )
}

#[test]
fn first_sighting_raises_alert_and_notifies_once() -> Result<()> {
    let t0 = Instant::now();
    let capture = Capture::default();
    let mut monitor = Monitor::new(
        settings(Duration::from_secs(20)),
        clocked_source(22, t0, Duration::from_secs(1)),
        ScriptedDetector::new(vec![vec![mite(0.73)], vec![mite(0.81)]]),
        RecordingRenderer::new(),
        inline(&capture),
    );

    assert_eq!(monitor.step()?, None);
    assert_eq!(monitor.alert_state(), AlertState::Active { raised_at: t0 });
    assert_eq!(capture.count(), 1);

    // Still inside the 20s window: banner stays, nobody is messaged again.
    assert_eq!(monitor.step()?, None);
    assert_eq!(monitor.alert_state(), AlertState::Active { raised_at: t0 });
    assert_eq!(capture.count(), 1);

    let summary = monitor.run()?;
    assert_eq!(summary.stop_reason, StopReason::EndOfStream);
    assert_eq!(monitor.alert_state(), AlertState::Idle);
    assert_eq!(capture.count(), 1);
    assert_eq!(summary.alerts_raised, 1);
    assert_eq!(summary.notifications.delivered, 1);
    Ok(())
}

#[test]
fn quiet_stream_never_alerts() -> Result<()> {
    let capture = Capture::default();
    let bee = Detection::new(BEE, 0.95, BoundingBox::from_corners(0, 0, 40, 40));
    let weak_mite = mite(0.49);
    let mut monitor = Monitor::new(
        settings(Duration::from_secs(20)),
        clocked_source(3, Instant::now(), Duration::from_millis(100)),
        ScriptedDetector::new(vec![vec![bee], vec![weak_mite], vec![]]),
        RecordingRenderer::new(),
        inline(&capture),
    );

    let summary = monitor.run()?;
    assert_eq!(summary.frames, 3);
    assert_eq!(summary.detections_accepted, 1);
    assert_eq!(summary.alerts_raised, 0);
    assert_eq!(capture.count(), 0);
    assert_eq!(monitor.alert_state(), AlertState::Idle);
    Ok(())
}

#[test]
fn sighting_after_expiry_starts_new_episode() -> Result<()> {
    let capture = Capture::default();
    let present = |yes: bool| if yes { vec![mite(0.9)] } else { vec![] };
    let script = [true, true, true, false, false, true]
        .into_iter()
        .map(present)
        .collect();
    let mut monitor = Monitor::new(
        settings(Duration::from_secs(2)),
        clocked_source(6, Instant::now(), Duration::from_millis(500)),
        ScriptedDetector::new(script),
        RecordingRenderer::new(),
        inline(&capture),
    );

    let summary = monitor.run()?;
    assert_eq!(summary.alerts_raised, 2);
    assert_eq!(capture.count(), 2);

    let banners: Vec<bool> = monitor
        .renderer()
        .frames()
        .iter()
        .map(|overlays| overlays.iter().any(|o| o.text() == Some(ALERT_BANNER_TEXT)))
        .collect();
    assert_eq!(banners, vec![true, true, true, true, true, true]);
    Ok(())
}

#[test]
fn failed_notification_does_not_stop_the_loop() -> Result<()> {
    let capture = Capture::failing();
    let mut monitor = Monitor::new(
        settings(Duration::from_secs(20)),
        clocked_source(4, Instant::now(), Duration::from_millis(100)),
        ScriptedDetector::new(vec![vec![mite(0.9)]]),
        RecordingRenderer::new(),
        inline(&capture),
    );

    let summary = monitor.run()?;
    assert_eq!(summary.stop_reason, StopReason::EndOfStream);
    assert_eq!(summary.frames, 4);
    assert_eq!(summary.notifications.failed, 1);
    assert_eq!(capture.count(), 1);
    assert!(monitor.alert_state().is_active());
    Ok(())
}

#[test]
fn background_dispatch_is_flushed_on_release() -> Result<()> {
    let capture = Capture::default();
    let dispatcher = NotificationDispatcher::new(
        Box::new(capture.clone()),
        Notification::advisory(),
        DispatchMode::Background,
    );
    let mut monitor = Monitor::new(
        settings(Duration::from_secs(20)),
        clocked_source(3, Instant::now(), Duration::from_millis(100)),
        ScriptedDetector::new(vec![vec![mite(0.9)]]),
        RecordingRenderer::new(),
        dispatcher,
    );

    let summary = monitor.run()?;
    assert_eq!(summary.notifications.requested, 1);
    assert_eq!(summary.notifications.delivered, 1);
    assert_eq!(capture.count(), 1);
    Ok(())
}

#[test]
fn end_of_stream_releases_exactly_once() -> Result<()> {
    let mut monitor = Monitor::new(
        settings(Duration::from_secs(20)),
        clocked_source(2, Instant::now(), Duration::from_millis(100)),
        ScriptedDetector::empty(),
        RecordingRenderer::new(),
        NotificationDispatcher::disabled(),
    );

    let summary = monitor.run()?;
    assert_eq!(summary.stop_reason, StopReason::EndOfStream);
    monitor.release();
    assert_eq!(monitor.source().releases(), 1);
    assert_eq!(monitor.renderer().releases(), 1);
    Ok(())
}

#[test]
fn overlays_are_drawn_boxes_then_banner_then_fps() -> Result<()> {
    let bee = Detection::new(BEE, 0.9, BoundingBox::from_corners(-5, 10, 20, 30));
    let mut monitor = Monitor::new(
        settings(Duration::from_secs(20)),
        clocked_source(2, Instant::now(), Duration::from_millis(50)),
        ScriptedDetector::new(vec![vec![mite(0.731)], vec![mite(0.6), bee]]),
        RecordingRenderer::new(),
        NotificationDispatcher::disabled(),
    );
    monitor.run()?;

    let frames = monitor.renderer().frames();
    let first: Vec<Option<&str>> = frames[0].iter().map(Overlay::text).collect();
    assert_eq!(first, vec![None, Some("Mite 0.74"), Some(ALERT_BANNER_TEXT)]);

    let second: Vec<Option<&str>> = frames[1].iter().map(Overlay::text).collect();
    assert_eq!(
        second,
        vec![
            None,
            Some("Mite 0.60"),
            None,
            Some("Bee 0.90"),
            Some(ALERT_BANNER_TEXT),
            Some("FPS: 20.00"),
        ]
    );

    match &frames[1][3] {
        Overlay::Text { origin, .. } => assert_eq!(*origin, (0, 35)),
        other => panic!("expected label text, got {:?}", other),
    }
    Ok(())
}
