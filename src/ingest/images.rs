//! Still-image directory source.
//!
//! Reads every `.jpg`, `.jpeg` and `.png` in a directory, in file-name order,
//! and ends the stream after the last one. Useful for replaying frames
//! exported from a hive camera.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

pub struct ImageDirSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    frame_limit: Option<u64>,
    frame_count: u64,
}

impl ImageDirSource {
    pub fn new(dir: impl AsRef<Path>, frame_limit: Option<u64>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(anyhow!("image source {} is not a directory", dir.display()));
        }
        Ok(Self {
            dir,
            files: Vec::new(),
            cursor: 0,
            frame_limit,
            frame_count: 0,
        })
    }
}

impl FrameSource for ImageDirSource {
    fn connect(&mut self) -> Result<()> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("list image directory {}", self.dir.display()))?
        {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| matches!(ext.to_lowercase().as_str(), "jpg" | "jpeg" | "png"))
                .unwrap_or(false);
            if is_image {
                files.push(path);
            }
        }
        files.sort();
        log::info!(
            "ImageDirSource: {} image(s) in {}",
            files.len(),
            self.dir.display()
        );
        self.files = files;
        self.cursor = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self
            .frame_limit
            .is_some_and(|limit| self.frame_count >= limit)
        {
            return Ok(None);
        }
        let Some(path) = self.files.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;

        let image = image::open(path)
            .with_context(|| format!("decode image {}", path.display()))?
            .to_rgb8();
        let (width, height) = image.dimensions();
        self.frame_count += 1;
        let frame = Frame::new(
            image.into_raw(),
            width,
            height,
            self.frame_count,
            Instant::now(),
        )?;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        self.files.clear();
        log::info!(
            "ImageDirSource: released {} after {} frames",
            self.dir.display(),
            self.frame_count
        );
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.dir.display().to_string(),
        }
    }
}
