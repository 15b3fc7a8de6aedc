#![cfg(feature = "render-snapshot")]

use anyhow::{anyhow, Context, Result};
use image::{ImageBuffer, Rgb};
use std::path::PathBuf;

use super::{Overlay, RenderControl, Renderer};
use crate::detect::BoundingBox;
use crate::frame::Frame;

/// Height of the filled strip drawn behind a text overlay, per scale unit.
const TEXT_STRIP_PX: i32 = 14;

/// Draws overlays into the frame and writes the annotated frame to disk.
///
/// Rectangles are drawn as outlines; text overlays become filled strips in
/// their background colour (the caption itself goes to the debug log, there
/// is no font rasteriser here). The file is overwritten every `every`
/// frames, so it always shows a recent view of the hive.
pub struct SnapshotRenderer {
    path: PathBuf,
    every: u64,
    written: u64,
}

impl SnapshotRenderer {
    pub fn new(path: impl Into<PathBuf>, every: u64) -> Self {
        Self {
            path: path.into(),
            every: every.max(1),
            written: 0,
        }
    }
}

impl Renderer for SnapshotRenderer {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    fn draw(&mut self, frame: &mut Frame, overlay: &Overlay) -> Result<()> {
        let (width, height) = (frame.width, frame.height);
        let sequence = frame.sequence;
        let mut canvas: ImageBuffer<Rgb<u8>, &mut [u8]> =
            ImageBuffer::from_raw(width, height, frame.pixels_mut())
                .ok_or_else(|| anyhow!("frame {} buffer does not fit {}x{}", sequence, width, height))?;

        match overlay {
            Overlay::Rect { bbox, color } => {
                draw_rect(&mut canvas, bbox, Rgb(*color), 2);
            }
            Overlay::Text {
                text,
                origin,
                style,
            } => {
                let strip_h = TEXT_STRIP_PX * style.scale as i32;
                let strip_w = (text.chars().count() as i32) * 8 * style.scale as i32;
                let strip = BoundingBox::from_corners(
                    origin.0,
                    origin.1 - strip_h,
                    origin.0 + strip_w,
                    origin.1,
                );
                fill_rect(&mut canvas, &strip, Rgb(style.background));
                log::debug!("frame {}: {}", sequence, text);
            }
        }
        Ok(())
    }

    fn present(&mut self, frame: &Frame) -> Result<RenderControl> {
        if frame.sequence % self.every == 0 {
            image::save_buffer(
                &self.path,
                frame.pixels(),
                frame.width,
                frame.height,
                image::ColorType::Rgb8,
            )
            .with_context(|| format!("write snapshot {}", self.path.display()))?;
            self.written += 1;
        }
        Ok(RenderControl::Continue)
    }

    fn release(&mut self) {
        log::info!(
            "snapshot renderer wrote {} snapshot(s) to {}",
            self.written,
            self.path.display()
        );
    }
}

fn clamp_box(canvas_w: u32, canvas_h: u32, bbox: &BoundingBox) -> Option<[u32; 4]> {
    if canvas_w == 0 || canvas_h == 0 {
        return None;
    }
    let clamp = |v: i32, max: u32| -> u32 { v.clamp(0, max as i32 - 1) as u32 };
    let x0 = clamp(bbox.x1, canvas_w);
    let y0 = clamp(bbox.y1, canvas_h);
    let x1 = clamp(bbox.x2, canvas_w);
    let y1 = clamp(bbox.y2, canvas_h);
    if x0 > x1 || y0 > y1 {
        return None;
    }
    Some([x0, y0, x1, y1])
}

fn draw_rect(
    canvas: &mut ImageBuffer<Rgb<u8>, &mut [u8]>,
    bbox: &BoundingBox,
    color: Rgb<u8>,
    thickness: u32,
) {
    let (w, h) = canvas.dimensions();
    let Some([x0, y0, x1, y1]) = clamp_box(w, h, bbox) else {
        return;
    };
    for t in 0..thickness {
        let xx0 = x0.saturating_add(t);
        let yy0 = y0.saturating_add(t);
        let xx1 = x1.saturating_sub(t);
        let yy1 = y1.saturating_sub(t);
        if xx0 > xx1 || yy0 > yy1 {
            continue;
        }
        for x in xx0..=xx1 {
            canvas.put_pixel(x, yy0, color);
            canvas.put_pixel(x, yy1, color);
        }
        for y in yy0..=yy1 {
            canvas.put_pixel(xx0, y, color);
            canvas.put_pixel(xx1, y, color);
        }
    }
}

fn fill_rect(canvas: &mut ImageBuffer<Rgb<u8>, &mut [u8]>, bbox: &BoundingBox, color: Rgb<u8>) {
    let (w, h) = canvas.dimensions();
    let Some([x0, y0, x1, y1]) = clamp_box(w, h, bbox) else {
        return;
    };
    for y in y0..=y1 {
        for x in x0..=x1 {
            canvas.put_pixel(x, y, color);
        }
    }
}
