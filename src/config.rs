use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::CaptureSettings;
use crate::monitor::MonitorSettings;
use crate::notify::{
    DispatchMode, LogNotifier, Notification, NotificationDispatcher, Notifier, TwilioNotifier,
    TwilioSettings, DEFAULT_ADVISORY_BODY, DEFAULT_ADVISORY_MEDIA_URL, DEFAULT_TWILIO_API_BASE,
};

const DEFAULT_SOURCE: &str = "0";
const DEFAULT_CAPTURE_WIDTH: u32 = 1850;
const DEFAULT_CAPTURE_HEIGHT: u32 = 1850;
const DEFAULT_TARGET_FPS: u32 = 30;
const DEFAULT_MODEL_PATH: &str = "Trained_models/best1.onnx";
const DEFAULT_MODEL_INPUT: u32 = 640;
const DEFAULT_SCORE_FLOOR: f32 = 0.05;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_CLASS_NAMES: [&str; 3] = ["Bee", "Mite", "pollen"];
const DEFAULT_CONFIDENCE: f32 = 0.5;
const DEFAULT_TARGET_LABEL: &str = "Mite";
const DEFAULT_ALERT_SECS: u64 = 20;
const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SNAPSHOT_PATH: &str = "hive_latest.jpg";
const DEFAULT_SNAPSHOT_EVERY: u64 = 30;

#[derive(Debug, Deserialize, Default)]
struct SentinelConfigFile {
    source: Option<SourceConfigFile>,
    model: Option<ModelConfigFile>,
    detection: Option<DetectionConfigFile>,
    alert: Option<AlertConfigFile>,
    notify: Option<NotifyConfigFile>,
    render: Option<RenderConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
    max_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    backend: Option<String>,
    path: Option<PathBuf>,
    input_size: Option<u32>,
    score_floor: Option<f32>,
    iou_threshold: Option<f32>,
    script: Option<PathBuf>,
    class_names: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    confidence_threshold: Option<f32>,
    target_label: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertConfigFile {
    duration_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct NotifyConfigFile {
    enabled: Option<bool>,
    channel: Option<String>,
    dispatch: Option<String>,
    account_sid: Option<String>,
    auth_token: Option<String>,
    from: Option<String>,
    to: Option<String>,
    whatsapp: Option<bool>,
    api_base: Option<String>,
    timeout_secs: Option<u64>,
    body: Option<String>,
    media_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RenderConfigFile {
    kind: Option<String>,
    snapshot_path: Option<PathBuf>,
    snapshot_every: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SentinelConfig {
    pub capture: CaptureSettings,
    pub model: ModelSettings,
    pub class_names: Vec<String>,
    pub confidence_threshold: f32,
    pub target_label: String,
    pub alert_duration: Duration,
    pub notify: NotifySettings,
    pub render: RenderSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelSettings {
    /// Replay detections from a JSON script (or none at all).
    Scripted { script: Option<PathBuf> },
    /// ONNX model run through tract.
    Tract(TractSettings),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TractSettings {
    pub path: PathBuf,
    /// Side of the square model input.
    pub input_size: u32,
    /// Candidates scoring below this are discarded inside the detector.
    pub score_floor: f32,
    /// Overlap above which same-class boxes are merged by NMS.
    pub iou_threshold: f32,
}

impl Default for TractSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_MODEL_PATH),
            input_size: DEFAULT_MODEL_INPUT,
            score_floor: DEFAULT_SCORE_FLOOR,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyChannel {
    Log,
    Twilio,
}

#[derive(Debug, Clone)]
pub struct NotifySettings {
    pub enabled: bool,
    pub channel: NotifyChannel,
    pub dispatch: DispatchMode,
    pub account_sid: String,
    pub auth_token: String,
    pub from: String,
    pub to: String,
    pub whatsapp: bool,
    pub api_base: String,
    pub timeout: Duration,
    pub message: Notification,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderSettings {
    Log,
    Snapshot { path: PathBuf, every: u64 },
}

impl SentinelConfig {
    /// Load from `SENTINEL_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SENTINEL_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit file (or defaults), then apply env overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SentinelConfigFile) -> Result<Self> {
        let source = file.source.unwrap_or_default();
        let capture = CaptureSettings {
            source: source.url.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            width: source.width.unwrap_or(DEFAULT_CAPTURE_WIDTH),
            height: source.height.unwrap_or(DEFAULT_CAPTURE_HEIGHT),
            target_fps: source.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
            max_frames: source.max_frames,
        };

        let mut model_file = file.model.unwrap_or_default();
        let class_names = model_file
            .class_names
            .take()
            .unwrap_or_else(|| DEFAULT_CLASS_NAMES.iter().map(|s| s.to_string()).collect());
        let model = parse_model(model_file)?;

        let detection = file.detection.unwrap_or_default();
        let alert_secs = file
            .alert
            .and_then(|alert| alert.duration_secs)
            .unwrap_or(DEFAULT_ALERT_SECS);

        let notify = file.notify.unwrap_or_default();
        let notify = NotifySettings {
            enabled: notify.enabled.unwrap_or(true),
            channel: parse_channel(notify.channel.as_deref().unwrap_or("log"))?,
            dispatch: notify
                .dispatch
                .as_deref()
                .unwrap_or("background")
                .parse()?,
            account_sid: notify.account_sid.unwrap_or_default(),
            auth_token: notify.auth_token.unwrap_or_default(),
            from: notify.from.unwrap_or_default(),
            to: notify.to.unwrap_or_default(),
            whatsapp: notify.whatsapp.unwrap_or(true),
            api_base: notify
                .api_base
                .unwrap_or_else(|| DEFAULT_TWILIO_API_BASE.to_string()),
            timeout: Duration::from_secs(
                notify.timeout_secs.unwrap_or(DEFAULT_NOTIFY_TIMEOUT_SECS),
            ),
            message: Notification {
                body: notify
                    .body
                    .unwrap_or_else(|| DEFAULT_ADVISORY_BODY.to_string()),
                media_url: match notify.media_url {
                    Some(url) if url.trim().is_empty() => None,
                    Some(url) => Some(url),
                    None => Some(DEFAULT_ADVISORY_MEDIA_URL.to_string()),
                },
            },
        };

        let render_file = file.render.unwrap_or_default();
        let render = match render_file.kind.as_deref().unwrap_or("log") {
            "log" => RenderSettings::Log,
            "snapshot" => RenderSettings::Snapshot {
                path: render_file
                    .snapshot_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_PATH)),
                every: render_file.snapshot_every.unwrap_or(DEFAULT_SNAPSHOT_EVERY),
            },
            other => {
                return Err(anyhow!(
                    "unknown renderer '{}' (expected log or snapshot)",
                    other
                ))
            }
        };

        Ok(Self {
            capture,
            model,
            class_names,
            confidence_threshold: detection.confidence_threshold.unwrap_or(DEFAULT_CONFIDENCE),
            target_label: detection
                .target_label
                .unwrap_or_else(|| DEFAULT_TARGET_LABEL.to_string()),
            alert_duration: Duration::from_secs(alert_secs),
            notify,
            render,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(source) = std::env::var("SENTINEL_SOURCE") {
            if !source.trim().is_empty() {
                self.capture.source = source;
            }
        }
        if let Ok(path) = std::env::var("SENTINEL_MODEL_PATH") {
            if !path.trim().is_empty() {
                if let ModelSettings::Tract(tract) = &mut self.model {
                    tract.path = PathBuf::from(path);
                } else {
                    self.model = ModelSettings::Tract(TractSettings {
                        path: PathBuf::from(path),
                        ..TractSettings::default()
                    });
                }
            }
        }
        if let Ok(names) = std::env::var("SENTINEL_CLASS_NAMES") {
            let parsed = split_csv(&names);
            if !parsed.is_empty() {
                self.class_names = parsed;
            }
        }
        if let Ok(threshold) = std::env::var("SENTINEL_CONFIDENCE") {
            self.confidence_threshold = threshold.trim().parse().map_err(|_| {
                anyhow!("SENTINEL_CONFIDENCE must be a number between 0 and 1")
            })?;
        }
        if let Ok(secs) = std::env::var("SENTINEL_ALERT_SECS") {
            let seconds: u64 = secs.trim().parse().map_err(|_| {
                anyhow!("SENTINEL_ALERT_SECS must be an integer number of seconds")
            })?;
            self.alert_duration = Duration::from_secs(seconds);
        }
        if let Ok(label) = std::env::var("SENTINEL_TARGET_LABEL") {
            if !label.trim().is_empty() {
                self.target_label = label.trim().to_string();
            }
        }
        if let Ok(enabled) = std::env::var("SENTINEL_NOTIFY_ENABLED") {
            self.notify.enabled = parse_bool(&enabled).ok_or_else(|| {
                anyhow!("SENTINEL_NOTIFY_ENABLED must be true/false")
            })?;
        }
        if let Ok(to) = std::env::var("SENTINEL_NOTIFY_TO") {
            if !to.trim().is_empty() {
                self.notify.to = to;
            }
        }
        if let Ok(sid) = std::env::var("TWILIO_ACCOUNT_SID") {
            if !sid.trim().is_empty() {
                self.notify.account_sid = sid;
            }
        }
        if let Ok(token) = std::env::var("TWILIO_AUTH_TOKEN") {
            if !token.trim().is_empty() {
                self.notify.auth_token = token;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !self.confidence_threshold.is_finite()
            || !(0.0..=1.0).contains(&self.confidence_threshold)
        {
            return Err(anyhow!(
                "confidence threshold must be within [0, 1], got {}",
                self.confidence_threshold
            ));
        }
        if self.class_names.is_empty() {
            return Err(anyhow!("class name list must not be empty"));
        }
        if let ModelSettings::Tract(tract) = &self.model {
            if tract.input_size == 0 {
                return Err(anyhow!("model.input_size must be positive"));
            }
            if !(0.0..=1.0).contains(&tract.score_floor) {
                return Err(anyhow!("model.score_floor must be within [0, 1]"));
            }
            if !(tract.iou_threshold > 0.0 && tract.iou_threshold <= 1.0) {
                return Err(anyhow!("model.iou_threshold must be within (0, 1]"));
            }
        }
        if !self.class_names.iter().any(|name| name == &self.target_label) {
            return Err(anyhow!(
                "target label '{}' is not one of the configured classes {:?}",
                self.target_label,
                self.class_names
            ));
        }
        if self.alert_duration.is_zero() {
            return Err(anyhow!("alert duration must be greater than zero"));
        }
        if self.notify.enabled && self.notify.channel == NotifyChannel::Twilio {
            for (name, value) in [
                ("account_sid", &self.notify.account_sid),
                ("auth_token", &self.notify.auth_token),
                ("from", &self.notify.from),
                ("to", &self.notify.to),
            ] {
                if value.trim().is_empty() {
                    return Err(anyhow!("twilio notifications need notify.{}", name));
                }
            }
        }
        if let RenderSettings::Snapshot { every, .. } = &self.render {
            if *every == 0 {
                return Err(anyhow!("render.snapshot_every must be at least 1"));
            }
        }
        Ok(())
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            class_names: self.class_names.clone(),
            confidence_threshold: self.confidence_threshold,
            alert_duration: self.alert_duration,
            target_label: self.target_label.clone(),
        }
    }
}

impl NotifySettings {
    /// Build the dispatcher these settings describe.
    pub fn dispatcher(&self) -> Result<NotificationDispatcher> {
        if !self.enabled {
            return Ok(NotificationDispatcher::disabled());
        }
        let notifier: Box<dyn Notifier> = match self.channel {
            NotifyChannel::Log => Box::new(LogNotifier),
            NotifyChannel::Twilio => Box::new(TwilioNotifier::new(TwilioSettings {
                account_sid: self.account_sid.clone(),
                auth_token: self.auth_token.clone(),
                from: self.from.clone(),
                to: self.to.clone(),
                whatsapp: self.whatsapp,
                api_base: self.api_base.clone(),
                timeout: self.timeout,
            })?),
        };
        Ok(NotificationDispatcher::new(
            notifier,
            self.message.clone(),
            self.dispatch,
        ))
    }
}

fn parse_model(file: ModelConfigFile) -> Result<ModelSettings> {
    match file.backend.as_deref().unwrap_or("tract") {
        "stub" | "scripted" => Ok(ModelSettings::Scripted {
            script: file.script,
        }),
        "tract" => Ok(ModelSettings::Tract(TractSettings {
            path: file
                .path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            input_size: file.input_size.unwrap_or(DEFAULT_MODEL_INPUT),
            score_floor: file.score_floor.unwrap_or(DEFAULT_SCORE_FLOOR),
            iou_threshold: file.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
        })),
        other => Err(anyhow!(
            "unknown model backend '{}' (expected tract or stub)",
            other
        )),
    }
}

fn parse_channel(value: &str) -> Result<NotifyChannel> {
    match value.trim().to_lowercase().as_str() {
        "log" => Ok(NotifyChannel::Log),
        "twilio" | "whatsapp" => Ok(NotifyChannel::Twilio),
        other => Err(anyhow!(
            "unknown notification channel '{}' (expected log or twilio)",
            other
        )),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_config_file(path: &Path) -> Result<SentinelConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> SentinelConfig {
        SentinelConfig::from_file(SentinelConfigFile::default()).unwrap()
    }

    #[test]
    fn defaults_match_the_field_setup() {
        let cfg = defaults();
        assert_eq!(cfg.capture.source, "0");
        assert_eq!((cfg.capture.width, cfg.capture.height), (1850, 1850));
        assert_eq!(cfg.class_names, vec!["Bee", "Mite", "pollen"]);
        assert_eq!(cfg.confidence_threshold, 0.5);
        assert_eq!(cfg.target_label, "Mite");
        assert_eq!(cfg.alert_duration, Duration::from_secs(20));
        assert_eq!(cfg.notify.channel, NotifyChannel::Log);
        assert_eq!(cfg.notify.dispatch, DispatchMode::Background);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let mut cfg = defaults();
        cfg.confidence_threshold = 1.5;
        assert!(cfg.validate().is_err());
        cfg.confidence_threshold = f32::NAN;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn target_label_must_be_a_known_class() {
        let mut cfg = defaults();
        cfg.target_label = "Wasp".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("Wasp"));
    }

    #[test]
    fn twilio_channel_needs_credentials() {
        let mut cfg = defaults();
        cfg.notify.channel = NotifyChannel::Twilio;
        assert!(cfg.validate().is_err());

        cfg.notify.enabled = false;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn parses_toml_sections() {
        let file: SentinelConfigFile = toml::from_str(
            r#"
            [source]
            url = "stub://apiary"
            max_frames = 50

            [model]
            backend = "stub"
            class_names = ["Bee", "Mite"]

            [detection]
            confidence_threshold = 0.2

            [render]
            kind = "snapshot"
            "#,
        )
        .unwrap();
        let cfg = SentinelConfig::from_file(file).unwrap();
        assert_eq!(cfg.capture.source, "stub://apiary");
        assert_eq!(cfg.capture.max_frames, Some(50));
        assert_eq!(cfg.model, ModelSettings::Scripted { script: None });
        assert_eq!(cfg.confidence_threshold, 0.2);
        assert_eq!(
            cfg.render,
            RenderSettings::Snapshot {
                path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
                every: DEFAULT_SNAPSHOT_EVERY
            }
        );
    }

    #[test]
    fn tract_tuning_comes_from_model_section() {
        let file: SentinelConfigFile = toml::from_str(
            r#"
            [model]
            path = "models/varroa.onnx"
            score_floor = 0.2
            iou_threshold = 0.6
            "#,
        )
        .unwrap();
        let cfg = SentinelConfig::from_file(file).unwrap();
        assert_eq!(
            cfg.model,
            ModelSettings::Tract(TractSettings {
                path: PathBuf::from("models/varroa.onnx"),
                input_size: DEFAULT_MODEL_INPUT,
                score_floor: 0.2,
                iou_threshold: 0.6,
            })
        );
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn iou_threshold_of_zero_is_rejected() {
        let mut cfg = defaults();
        cfg.model = ModelSettings::Tract(TractSettings {
            iou_threshold: 0.0,
            ..TractSettings::default()
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn empty_media_url_disables_attachment() {
        let file: SentinelConfigFile =
            serde_json::from_str(r#"{"notify": {"media_url": ""}}"#).unwrap();
        let cfg = SentinelConfig::from_file(file).unwrap();
        assert_eq!(cfg.notify.message.media_url, None);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let file = ModelConfigFile {
            backend: Some("yolo9000".into()),
            ..ModelConfigFile::default()
        };
        assert!(parse_model(file).is_err());
    }

    #[test]
    fn disabled_notifications_build_noop_dispatcher() -> Result<()> {
        let mut cfg = defaults();
        cfg.notify.enabled = false;
        assert!(!cfg.notify.dispatcher()?.is_enabled());
        Ok(())
    }
}
