//! hive_sentinel - Varroa mite monitor
//!
//! Reads frames from a camera (or image directory), runs the mite detector,
//! draws the annotated frame and sends one advisory per alert episode.
//! Ctrl-C stops the loop after the frame in flight; the camera is always
//! released on the way out.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use hive_sentinel::config::{ModelSettings, RenderSettings};
use hive_sentinel::detect::ScriptedDetector;
use hive_sentinel::ingest::open_source;
use hive_sentinel::render::LogRenderer;
use hive_sentinel::{Detector, FilterError, Monitor, Renderer, SentinelConfig, StopSignal};

#[derive(Parser, Debug)]
#[command(author, version, about = "Watch a beehive camera for Varroa mites")]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "SENTINEL_CONFIG")]
    config: Option<PathBuf>,

    /// Frame source: camera id, /dev/videoN, image directory or stub://name.
    #[arg(long)]
    source: Option<String>,

    /// Minimum confidence for a detection to count.
    #[arg(long)]
    confidence: Option<f32>,

    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,

    /// Replay detections from a JSON script instead of running a model.
    #[arg(long)]
    detections: Option<PathBuf>,

    /// Do not send notifications.
    #[arg(long)]
    no_notify: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = SentinelConfig::load_from(args.config.as_deref())?;
    if let Some(source) = args.source {
        cfg.capture.source = source;
    }
    if let Some(confidence) = args.confidence {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(anyhow!("--confidence must be within [0, 1]"));
        }
        cfg.confidence_threshold = confidence;
    }
    if args.max_frames.is_some() {
        cfg.capture.max_frames = args.max_frames;
    }
    if let Some(script) = args.detections {
        cfg.model = ModelSettings::Scripted {
            script: Some(script),
        };
    }
    if args.no_notify {
        cfg.notify.enabled = false;
    }

    let source = open_source(&cfg.capture)?;
    let detector = build_detector(&cfg)?;
    let renderer = build_renderer(&cfg.render)?;
    let dispatcher = cfg.notify.dispatcher()?;
    if !dispatcher.is_enabled() {
        log::info!("notifications disabled");
    }

    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        handler_stop.request();
    })
    .expect("error setting Ctrl-C handler");

    let mut monitor = Monitor::new(
        cfg.monitor_settings(),
        source,
        detector,
        renderer,
        dispatcher,
    )
    .with_stop_signal(stop);

    match monitor.run() {
        Ok(summary) => {
            log::info!(
                "hive_sentinel finished after {} frames ({} alert episodes)",
                summary.frames,
                summary.alerts_raised
            );
            Ok(())
        }
        Err(err) => {
            if let Some(mismatch) = err.downcast_ref::<FilterError>() {
                log::error!(
                    "model and class list disagree: {}. Check model.class_names against the model you loaded.",
                    mismatch
                );
            }
            Err(err)
        }
    }
}

fn build_detector(cfg: &SentinelConfig) -> Result<Box<dyn Detector>> {
    match &cfg.model {
        ModelSettings::Scripted { script: Some(path) } => Ok(Box::new(
            ScriptedDetector::from_json_file(path)
                .with_context(|| format!("load detection script {}", path.display()))?,
        )),
        ModelSettings::Scripted { script: None } => {
            log::warn!("no model configured; every frame will be empty");
            Ok(Box::new(ScriptedDetector::empty()))
        }
        #[cfg(feature = "backend-tract")]
        ModelSettings::Tract(tract) => Ok(Box::new(
            hive_sentinel::detect::TractDetector::new(&tract.path, tract.input_size)?
                .with_score_floor(tract.score_floor)
                .with_iou_threshold(tract.iou_threshold),
        )),
        #[cfg(not(feature = "backend-tract"))]
        ModelSettings::Tract(tract) => Err(anyhow!(
            "model {} needs the backend-tract feature (or set model.backend = \"stub\")",
            tract.path.display()
        )),
    }
}

fn build_renderer(settings: &RenderSettings) -> Result<Box<dyn Renderer>> {
    match settings {
        RenderSettings::Log => Ok(Box::new(LogRenderer)),
        #[cfg(feature = "render-snapshot")]
        RenderSettings::Snapshot { path, every } => Ok(Box::new(
            hive_sentinel::render::SnapshotRenderer::new(path.clone(), *every),
        )),
        #[cfg(not(feature = "render-snapshot"))]
        RenderSettings::Snapshot { path, .. } => Err(anyhow!(
            "snapshot output to {} needs the render-snapshot feature",
            path.display()
        )),
    }
}
