//! Hive Sentinel
//!
//! Watches a beehive camera feed for Varroa mites. Each frame goes through
//! an object detector, low-confidence detections are dropped, and the first
//! mite sighting of an alert episode raises an on-screen banner and sends a
//! single WhatsApp/SMS advisory.
//!
//! # Module Structure
//!
//! - `frame`: RGB frames with capture timestamps
//! - `ingest`: Frame sources (camera, image directory, synthetic)
//! - `detect`: Detector seam and backends (tract ONNX, scripted replay)
//! - `filter`: Confidence threshold and class labelling
//! - `alert`: Debounced alert state machine
//! - `notify`: Fire-and-forget notification dispatch (Twilio, log)
//! - `render`: Overlay composition and renderers
//! - `monitor`: The per-frame loop tying everything together
//! - `config`: File and environment configuration

pub mod alert;
pub mod config;
pub mod detect;
pub mod filter;
pub mod fps;
pub mod frame;
pub mod ingest;
pub mod monitor;
pub mod notify;
pub mod render;

pub use alert::{AlertController, AlertEvent, AlertState, DEFAULT_ALERT_DURATION};
pub use config::SentinelConfig;
pub use detect::{BoundingBox, Detection, Detector};
pub use filter::{DetectionFilter, FilterError, FilteredDetection};
pub use frame::Frame;
pub use ingest::FrameSource;
pub use monitor::{Monitor, MonitorSettings, RunSummary, StopReason, StopSignal};
pub use notify::{Notification, NotificationDispatcher, Notifier};
pub use render::{Overlay, Renderer};
