//! Camera pixel formats to packed RGB.

use anyhow::{anyhow, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    Yuyv,
    Nv12,
}

impl PixelFormat {
    /// Map a V4L2 fourcc to a format we can convert, if any.
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(Self::Rgb24),
            b"YUYV" => Some(Self::Yuyv),
            b"NV12" => Some(Self::Nv12),
            _ => None,
        }
    }

    /// Bytes a full frame occupies in this format.
    fn frame_len(self, width: u32, height: u32) -> Option<usize> {
        let pixels = (width as usize).checked_mul(height as usize)?;
        match self {
            Self::Rgb24 => pixels.checked_mul(3),
            Self::Yuyv => pixels.checked_mul(2),
            Self::Nv12 => pixels.checked_add(pixels / 2),
        }
    }
}

pub(crate) fn normalize_to_rgb(
    raw: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    let expected = format
        .frame_len(width, height)
        .ok_or_else(|| anyhow!("{}x{} frame is too large", width, height))?;
    let chroma_pairs_fit = match format {
        PixelFormat::Rgb24 => true,
        PixelFormat::Yuyv => width % 2 == 0,
        PixelFormat::Nv12 => width % 2 == 0 && height % 2 == 0,
    };
    if raw.len() != expected || !chroma_pairs_fit {
        return Err(anyhow!(
            "{:?} buffer of {} bytes does not hold a {}x{} frame ({} expected)",
            format,
            raw.len(),
            width,
            height,
            expected
        ));
    }

    match format {
        PixelFormat::Rgb24 => Ok(raw.to_vec()),
        PixelFormat::Yuyv => Ok(yuyv_to_rgb(raw, expected / 2 * 3)),
        PixelFormat::Nv12 => Ok(nv12_to_rgb(raw, width as usize)),
    }
}

/// Packed 4:2:2: `Y0 U Y1 V` covers two horizontally adjacent pixels.
fn yuyv_to_rgb(raw: &[u8], rgb_len: usize) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(rgb_len);
    for quad in raw.chunks_exact(4) {
        let (u, v) = (quad[1], quad[3]);
        push_rgb(&mut rgb, quad[0], u, v);
        push_rgb(&mut rgb, quad[2], u, v);
    }
    rgb
}

/// Planar 4:2:0: a full luma plane, then one interleaved `U V` row for
/// every two luma rows.
fn nv12_to_rgb(raw: &[u8], width: usize) -> Vec<u8> {
    let (luma, chroma) = raw.split_at(raw.len() / 3 * 2);
    let mut rgb = Vec::with_capacity(luma.len() * 3);
    for (row, y_row) in luma.chunks_exact(width).enumerate() {
        let uv_row = &chroma[(row / 2) * width..][..width];
        for (y_pair, uv) in y_row.chunks_exact(2).zip(uv_row.chunks_exact(2)) {
            push_rgb(&mut rgb, y_pair[0], uv[0], uv[1]);
            push_rgb(&mut rgb, y_pair[1], uv[0], uv[1]);
        }
    }
    rgb
}

/// Full-range BT.601.
fn push_rgb(out: &mut Vec<u8>, y: u8, u: u8, v: u8) {
    let y = f32::from(y);
    let u = f32::from(u) - 128.0;
    let v = f32::from(v) - 128.0;
    let channel = |value: f32| value.round().clamp(0.0, 255.0) as u8;
    out.extend([
        channel(y + 1.402 * v),
        channel(y - 0.344_136 * u - 0.714_136 * v),
        channel(y + 1.772 * u),
    ]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourcc_mapping_covers_camera_fallbacks() {
        assert_eq!(PixelFormat::from_fourcc(b"RGB3"), Some(PixelFormat::Rgb24));
        assert_eq!(PixelFormat::from_fourcc(b"YUYV"), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(b"NV12"), Some(PixelFormat::Nv12));
        assert_eq!(PixelFormat::from_fourcc(b"MJPG"), None);
    }

    #[test]
    fn neutral_chroma_gives_gray() -> Result<()> {
        let nv12 = [vec![128u8; 4], vec![128u8; 2]].concat();
        assert_eq!(normalize_to_rgb(&nv12, 2, 2, PixelFormat::Nv12)?, vec![128u8; 12]);

        let yuyv = vec![90u8, 128, 90, 128];
        assert_eq!(normalize_to_rgb(&yuyv, 2, 1, PixelFormat::Yuyv)?, vec![90u8; 6]);
        Ok(())
    }

    #[test]
    fn nv12_chroma_row_is_shared_by_two_luma_rows() -> Result<()> {
        // 4x2 frame: left pixel pair tinted red (high V), right pair neutral.
        let luma = vec![100u8; 8];
        let chroma = vec![128u8, 200, 128, 128];
        let rgb = normalize_to_rgb(&[luma, chroma].concat(), 4, 2, PixelFormat::Nv12)?;

        let pixel = |x: usize, y: usize| &rgb[(y * 4 + x) * 3..][..3];
        for y in 0..2 {
            assert!(pixel(0, y)[0] > pixel(0, y)[2]);
            assert_eq!(pixel(1, y), pixel(0, y));
            assert_eq!(pixel(3, y), &[100, 100, 100]);
        }
        Ok(())
    }

    #[test]
    fn wrong_buffer_sizes_are_rejected() {
        assert!(normalize_to_rgb(&[1u8; 8], 1, 3, PixelFormat::Rgb24).is_err());
        assert!(normalize_to_rgb(&[0u8; 6], 3, 1, PixelFormat::Yuyv).is_err());
        assert!(normalize_to_rgb(&[0u8; 7], 2, 2, PixelFormat::Nv12).is_err());
    }
}
