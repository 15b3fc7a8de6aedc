use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Object-detection model seen from the monitor loop.
///
/// A detector is a function from one frame to the detections it contains.
/// Each call is a blocking round-trip; implementations must not keep the
/// frame beyond the call.
pub trait Detector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame. Order of the returned detections is kept
    /// all the way to rendering.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        (**self).detect(frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
