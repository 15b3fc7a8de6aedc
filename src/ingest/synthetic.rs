//! Synthetic frame source (`stub://`).
//!
//! Produces a slowly shifting gradient so downstream stages see changing
//! pixels. Timestamps come from the wall clock unless a fixed step is set,
//! in which case frame N is captured at `start + step * (N - 1)`.

use anyhow::Result;
use std::time::{Duration, Instant};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// End the stream after this many frames; `None` runs forever.
    pub frame_limit: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "stub://hive".to_string(),
            width: 64,
            height: 48,
            frame_limit: None,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
    scene_state: u8,
    clock: Option<(Instant, Duration)>,
    releases: u32,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            scene_state: 0,
            clock: None,
            releases: 0,
        }
    }

    /// Stamp frames at fixed intervals instead of reading the clock.
    pub fn with_fixed_step(mut self, start: Instant, step: Duration) -> Self {
        self.clock = Some((start, step));
        self
    }

    /// How many times `release` was called.
    pub fn releases(&self) -> u32 {
        self.releases
    }

    fn timestamp(&self) -> Instant {
        match self.clock {
            Some((start, step)) => start + step * (self.frame_count - 1) as u32,
            None => Instant::now(),
        }
    }

    fn generate_synthetic_pixels(&mut self) -> Vec<u8> {
        let pixel_count = (self.config.width as usize) * (self.config.height as usize) * 3;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        log::info!(
            "SyntheticSource: connected to {} ({}x{})",
            self.config.name,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(limit) = self.config.frame_limit {
            if self.frame_count >= limit {
                return Ok(None);
            }
        }
        self.frame_count += 1;

        let pixels = self.generate_synthetic_pixels();
        let frame = Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            self.frame_count,
            self.timestamp(),
        )?;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        self.releases += 1;
        log::info!(
            "SyntheticSource: released {} after {} frames",
            self.config.name,
            self.frame_count
        );
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.name.clone(),
        }
    }
}
