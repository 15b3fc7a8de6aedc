//! Frame overlays.
//!
//! The monitor describes what belongs on a frame as a list of `Overlay`s and
//! hands them to a `Renderer`. The list is always ordered boxes and labels
//! first, then the alert banner, then the FPS counter, so later overlays
//! win where they overlap.

#[cfg(feature = "render-snapshot")]
mod snapshot;

use anyhow::Result;

use crate::detect::BoundingBox;
use crate::filter::FilteredDetection;
use crate::frame::Frame;

#[cfg(feature = "render-snapshot")]
pub use snapshot::SnapshotRenderer;

pub const ALERT_BANNER_TEXT: &str = "ALERT: Varroa Mite detected!";

const BOX_COLOR: [u8; 3] = [255, 0, 255];
const ALERT_COLOR: [u8; 3] = [255, 0, 0];

/// How a text overlay should look.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextStyle {
    pub scale: u32,
    pub thickness: u32,
    /// Background colour of the text box (RGB).
    pub background: [u8; 3],
}

impl TextStyle {
    const LABEL: TextStyle = TextStyle {
        scale: 1,
        thickness: 1,
        background: BOX_COLOR,
    };
    const BANNER: TextStyle = TextStyle {
        scale: 2,
        thickness: 2,
        background: ALERT_COLOR,
    };
}

/// One draw request.
#[derive(Clone, Debug, PartialEq)]
pub enum Overlay {
    Rect {
        bbox: BoundingBox,
        color: [u8; 3],
    },
    Text {
        text: String,
        origin: (i32, i32),
        style: TextStyle,
    },
}

impl Overlay {
    pub fn text(&self) -> Option<&str> {
        match self {
            Overlay::Text { text, .. } => Some(text),
            Overlay::Rect { .. } => None,
        }
    }
}

/// Build the ordered overlay list for one frame.
pub fn compose_overlays(
    detections: &[FilteredDetection],
    show_alert: bool,
    fps: Option<f64>,
) -> Vec<Overlay> {
    let mut overlays = Vec::with_capacity(detections.len() * 2 + 2);
    for detection in detections {
        let bbox = detection.detection.bbox;
        overlays.push(Overlay::Rect {
            bbox,
            color: BOX_COLOR,
        });
        overlays.push(Overlay::Text {
            text: detection.caption(),
            origin: (bbox.x1.max(0), bbox.y1.max(35)),
            style: TextStyle::LABEL,
        });
    }
    if show_alert {
        overlays.push(Overlay::Text {
            text: ALERT_BANNER_TEXT.to_string(),
            origin: (20, 50),
            style: TextStyle::BANNER,
        });
    }
    if let Some(fps) = fps {
        overlays.push(Overlay::Text {
            text: format!("FPS: {:.2}", fps),
            origin: (20, 100),
            style: TextStyle::LABEL,
        });
    }
    overlays
}

/// What the renderer wants the loop to do after presenting a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderControl {
    Continue,
    /// The viewer asked to stop (e.g. a quit key).
    Quit,
}

/// Display collaborator.
pub trait Renderer {
    fn name(&self) -> &'static str;

    fn draw(&mut self, frame: &mut Frame, overlay: &Overlay) -> Result<()>;

    /// Called once per frame after all overlays were drawn.
    fn present(&mut self, frame: &Frame) -> Result<RenderControl>;

    /// Close windows or files. Called once when the loop ends.
    fn release(&mut self) {}
}

impl<R: Renderer + ?Sized> Renderer for Box<R> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn draw(&mut self, frame: &mut Frame, overlay: &Overlay) -> Result<()> {
        (**self).draw(frame, overlay)
    }

    fn present(&mut self, frame: &Frame) -> Result<RenderControl> {
        (**self).present(frame)
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// Headless renderer: overlays go to the debug log.
#[derive(Default)]
pub struct LogRenderer;

impl Renderer for LogRenderer {
    fn name(&self) -> &'static str {
        "log"
    }

    fn draw(&mut self, frame: &mut Frame, overlay: &Overlay) -> Result<()> {
        match overlay {
            Overlay::Rect { bbox, .. } => log::debug!(
                "frame {}: box ({}, {})-({}, {})",
                frame.sequence,
                bbox.x1,
                bbox.y1,
                bbox.x2,
                bbox.y2
            ),
            Overlay::Text { text, .. } => log::debug!("frame {}: {}", frame.sequence, text),
        }
        Ok(())
    }

    fn present(&mut self, _frame: &Frame) -> Result<RenderControl> {
        Ok(RenderControl::Continue)
    }
}

/// Keeps every overlay it is given, per frame.
#[derive(Default)]
pub struct RecordingRenderer {
    frames: Vec<Vec<Overlay>>,
    pending: Vec<Overlay>,
    quit_after: Option<usize>,
    releases: usize,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to stop after this many presented frames.
    pub fn quit_after(mut self, frames: usize) -> Self {
        self.quit_after = Some(frames);
        self
    }

    /// Overlays of each presented frame, in draw order.
    pub fn frames(&self) -> &[Vec<Overlay>] {
        &self.frames
    }

    pub fn releases(&self) -> usize {
        self.releases
    }
}

impl Renderer for RecordingRenderer {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn draw(&mut self, _frame: &mut Frame, overlay: &Overlay) -> Result<()> {
        self.pending.push(overlay.clone());
        Ok(())
    }

    fn present(&mut self, _frame: &Frame) -> Result<RenderControl> {
        self.frames.push(std::mem::take(&mut self.pending));
        match self.quit_after {
            Some(limit) if self.frames.len() >= limit => Ok(RenderControl::Quit),
            _ => Ok(RenderControl::Continue),
        }
    }

    fn release(&mut self) {
        self.releases += 1;
    }
}
