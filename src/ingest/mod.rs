//! Frame sources.
//!
//! Sources hand the monitor loop one `Frame` at a time:
//! - Synthetic frames (`stub://name`), for tests and dry runs
//! - A directory of still images, read in file-name order (feature: ingest-images)
//! - USB/V4L2 cameras by device path or camera id (feature: ingest-v4l2)
//!
//! `Ok(None)` from `next_frame` is a clean end of stream, never an error.

#[cfg(feature = "ingest-images")]
pub mod images;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};

use crate::frame::Frame;

#[cfg(feature = "ingest-images")]
pub use images::ImageDirSource;
pub use synthetic::{SyntheticConfig, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::{V4l2Config, V4l2Source};

/// Pull-based frame producer.
pub trait FrameSource {
    /// Open the device or stream. Sources that need no setup keep the default.
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Next frame, or `None` once the stream has ended.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Give back the device or file handles. Called once when the loop ends.
    fn release(&mut self);

    fn stats(&self) -> SourceStats;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn stats(&self) -> SourceStats {
        (**self).stats()
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// Capture request shared by every source kind.
#[derive(Clone, Debug)]
pub struct CaptureSettings {
    /// `stub://name`, a camera id (`0`), a device node (`/dev/video0`) or a
    /// directory of images.
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
    /// Stop after this many frames.
    pub max_frames: Option<u64>,
}

/// Open the source named by `settings.source`.
pub fn open_source(settings: &CaptureSettings) -> Result<Box<dyn FrameSource>> {
    let source = settings.source.trim();
    if source.is_empty() {
        return Err(anyhow!("capture source must not be empty"));
    }

    if source.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(SyntheticConfig {
            name: source.to_string(),
            width: settings.width,
            height: settings.height,
            frame_limit: settings.max_frames,
        })));
    }

    if let Some(device) = camera_device(source) {
        #[cfg(feature = "ingest-v4l2")]
        {
            return Ok(Box::new(V4l2Source::new(V4l2Config {
                device,
                target_fps: settings.target_fps,
                width: settings.width,
                height: settings.height,
                frame_limit: settings.max_frames,
            })?));
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            return Err(anyhow!(
                "camera capture from {} requires the ingest-v4l2 feature",
                device
            ));
        }
    }

    if source.contains("://") {
        return Err(anyhow!(
            "unsupported capture source '{}' (expected stub://, a camera id, a device node or a directory)",
            source
        ));
    }

    #[cfg(feature = "ingest-images")]
    {
        Ok(Box::new(ImageDirSource::new(source, settings.max_frames)?))
    }
    #[cfg(not(feature = "ingest-images"))]
    {
        Err(anyhow!(
            "reading frames from {} requires the ingest-images feature",
            source
        ))
    }
}

/// Map a camera id or device node to a device path.
fn camera_device(source: &str) -> Option<String> {
    if let Ok(id) = source.parse::<u32>() {
        return Some(format!("/dev/video{}", id));
    }
    if source.starts_with("/dev/video") {
        return Some(source.to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(source: &str) -> CaptureSettings {
        CaptureSettings {
            source: source.to_string(),
            width: 32,
            height: 24,
            target_fps: 10,
            max_frames: Some(2),
        }
    }

    #[test]
    fn camera_ids_map_to_device_nodes() {
        assert_eq!(camera_device("0").as_deref(), Some("/dev/video0"));
        assert_eq!(camera_device("/dev/video2").as_deref(), Some("/dev/video2"));
        assert_eq!(camera_device("frames/"), None);
    }

    #[test]
    fn stub_source_honours_frame_limit() -> Result<()> {
        let mut source = open_source(&settings("stub://hive"))?;
        source.connect()?;
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.stats().frames_captured, 2);
        Ok(())
    }

    #[test]
    fn network_urls_are_rejected() {
        let err = open_source(&settings("rtsp://camera")).err().unwrap();
        assert!(err.to_string().contains("unsupported capture source"));
    }

    #[test]
    fn empty_source_is_rejected() {
        assert!(open_source(&settings("  ")).is_err());
    }
}
