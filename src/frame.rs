//! Captured frames.
//!
//! A `Frame` is what a `FrameSource` hands to the monitor loop: packed RGB8
//! pixels plus the monotonic instant it was captured. Frames live for exactly
//! one loop iteration; nothing in the crate retains them afterwards.

use anyhow::{anyhow, Result};
use std::time::Instant;

/// One captured video frame (packed RGB8, row-major).
pub struct Frame {
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Source-assigned sequence number, starting at 1.
    pub sequence: u64,
    /// Monotonic capture time. Drives FPS and alert expiry.
    pub captured_at: Instant,
}

impl Frame {
    /// Build a frame, checking that the buffer matches the dimensions.
    pub fn new(
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        sequence: u64,
        captured_at: Instant,
    ) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "frame {}: expected {} RGB bytes for {}x{}, got {}",
                sequence,
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            sequence,
            captured_at,
        })
    }

    /// Solid black frame. Handy for sources and tests that only need timing.
    pub fn blank(width: u32, height: u32, sequence: u64, captured_at: Instant) -> Result<Self> {
        let len = rgb_len(width, height)?;
        Self::new(vec![0u8; len], width, height, sequence, captured_at)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Mutable pixel access for renderers that annotate in place.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Pixel content is deliberately left out of debug output.
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .finish()
    }
}

pub(crate) fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("frame dimensions {}x{} overflow", width, height))
}
