//! Pixel format conversion of captured frames into RGB images.

use image::{ImageFormat, RgbImage};

use crate::traits::{CameraError, FourCC, Frame, Result, StreamKind};

/// Depth values at or above this are treated as invalid.
const DEPTH_INVALID_MM: u16 = 10_000;

/// Fallback range when a frame holds no valid depth.
const DEPTH_FALLBACK_RANGE: (u16, u16) = (0, 4000);

/// Range of depth values mapped onto the colormap.
///
/// Unset bounds are taken from the valid pixels of each frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepthRange {
    /// Nearest depth in millimetres.
    pub min_mm: Option<u16>,
    /// Farthest depth in millimetres.
    pub max_mm: Option<u16>,
}

impl DepthRange {
    /// Fully auto-ranged.
    #[must_use]
    pub const fn auto() -> Self {
        Self {
            min_mm: None,
            max_mm: None,
        }
    }

    /// Fixed range.
    #[must_use]
    pub const fn fixed(min_mm: u16, max_mm: u16) -> Self {
        Self {
            min_mm: Some(min_mm),
            max_mm: Some(max_mm),
        }
    }

    fn resolve(self, depth: &[u16]) -> (u16, u16) {
        let (min, max) = match (self.min_mm, self.max_mm) {
            (Some(min), Some(max)) => (min, max),
            (min, max) => {
                let mut lo = u16::MAX;
                let mut hi = 0u16;
                for &d in depth.iter().filter(|&&d| is_valid_depth(d)) {
                    lo = lo.min(d);
                    hi = hi.max(d);
                }
                if hi <= lo {
                    (
                        min.unwrap_or(DEPTH_FALLBACK_RANGE.0),
                        max.unwrap_or(DEPTH_FALLBACK_RANGE.1),
                    )
                } else {
                    (min.unwrap_or(lo), max.unwrap_or(hi))
                }
            }
        };
        (min, max.max(min.saturating_add(1)))
    }
}

const fn is_valid_depth(d: u16) -> bool {
    d != 0 && d < DEPTH_INVALID_MM
}

/// Convert a frame into an RGB image.
pub fn frame_to_rgb(frame: &Frame, depth_range: DepthRange) -> Result<RgbImage> {
    let format = &frame.format;

    if format.fourcc == FourCC::MJPG {
        let image = image::load_from_memory_with_format(&frame.data, ImageFormat::Jpeg)?;
        return Ok(image.to_rgb8());
    }

    let bpp = format
        .fourcc
        .bytes_per_pixel()
        .ok_or(CameraError::FormatNotSupported(format.fourcc))?;

    if format.width == 0 || format.height == 0 {
        return Ok(RgbImage::new(format.width, format.height));
    }

    let width = format.width as usize;
    let height = format.height as usize;
    let row_bytes = width * bpp as usize;
    let stride = (format.stride as usize).max(row_bytes);
    // The last row may omit trailing padding.
    let expected = stride * (height - 1) + row_bytes;

    if frame.data.len() < expected {
        return Err(CameraError::FrameTooShort {
            format: format.clone(),
            expected,
            actual: frame.data.len(),
        });
    }

    let rows = frame
        .data
        .chunks(stride)
        .take(height)
        .filter_map(|row| row.get(..row_bytes));

    let mut rgb = Vec::with_capacity(width * height * 3);
    match &format.fourcc.0 {
        b"YUYV" => rows.for_each(|row| packed_422_to_rgb(row, [0, 1, 2, 3], &mut rgb)),
        b"UYVY" => rows.for_each(|row| packed_422_to_rgb(row, [1, 0, 3, 2], &mut rgb)),
        b"RGB3" => rows.for_each(|row| rgb.extend_from_slice(row)),
        b"BGR3" => rows.for_each(|row| {
            for px in row.chunks_exact(3) {
                if let [b, g, r] = *px {
                    rgb.extend_from_slice(&[r, g, b]);
                }
            }
        }),
        b"GREY" => rows.for_each(|row| {
            for &g in row {
                rgb.extend_from_slice(&[g, g, g]);
            }
        }),
        // Left image of the interleaved pair.
        b"Y8I " => rows.for_each(|row| {
            for &g in row.iter().step_by(2) {
                rgb.extend_from_slice(&[g, g, g]);
            }
        }),
        // Calibration infrared: keep the most significant byte.
        b"Y16 " if frame.kind == StreamKind::Infrared => rows.for_each(|row| {
            for px in row.chunks_exact(2) {
                if let [_, g] = *px {
                    rgb.extend_from_slice(&[g, g, g]);
                }
            }
        }),
        b"Z16 " | b"Y16 " => {
            let depth: Vec<u16> = rows
                .flat_map(|row| {
                    row.chunks_exact(2).map(|px| match *px {
                        [lo, hi] => u16::from_le_bytes([lo, hi]),
                        _ => 0,
                    })
                })
                .collect();
            depth_to_rgb(&depth, depth_range, &mut rgb);
        }
        _ => return Err(CameraError::FormatNotSupported(format.fourcc)),
    }

    RgbImage::from_raw(format.width, format.height, rgb).ok_or_else(|| {
        CameraError::FrameTooShort {
            format: format.clone(),
            expected,
            actual: frame.data.len(),
        }
    })
}

/// Convert one row of packed 4:2:2 data; `order` gives the byte positions
/// of Y0, U, Y1, V within each 4-byte group.
fn packed_422_to_rgb(row: &[u8], order: [usize; 4], out: &mut Vec<u8>) {
    let [y0, u, y1, v] = order;
    for group in row.chunks_exact(4) {
        let (Some(&y0), Some(&u), Some(&y1), Some(&v)) =
            (group.get(y0), group.get(u), group.get(y1), group.get(v))
        else {
            continue;
        };
        let (r, g, b) = yuv_to_rgb(y0, u, v);
        out.extend_from_slice(&[r, g, b]);
        let (r, g, b) = yuv_to_rgb(y1, u, v);
        out.extend_from_slice(&[r, g, b]);
    }
}

/// Convert YUV values to RGB using the ITU-R BT.601 formula.
#[must_use]
#[allow(clippy::many_single_char_names)]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y_f = f32::from(y);
    let u_f = f32::from(u) - 128.0;
    let v_f = f32::from(v) - 128.0;

    let r = 1.402f32.mul_add(v_f, y_f);
    let g = 0.714_14f32.mul_add(-v_f, 0.344_14f32.mul_add(-u_f, y_f));
    let b = 1.772f32.mul_add(u_f, y_f);

    (to_channel(r), to_channel(g), to_channel(b))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_channel(val: f32) -> u8 {
    val.clamp(0.0, 255.0) as u8
}

/// Colorize depth with the Turbo colormap (blue = near, red = far).
fn depth_to_rgb(depth: &[u16], range: DepthRange, out: &mut Vec<u8>) {
    let (min, max) = range.resolve(depth);
    let span = f32::from(max - min);

    for &d in depth {
        if is_valid_depth(d) {
            let t = (f32::from(d.saturating_sub(min)) / span).clamp(0.0, 1.0);
            out.extend_from_slice(&turbo(t));
        } else {
            out.extend_from_slice(&[0, 0, 0]);
        }
    }
}

/// Polynomial approximation of Google's Turbo colormap.
fn turbo(t: f32) -> [u8; 3] {
    let r = t.mul_add(
        t.mul_add(
            t.mul_add(t.mul_add(t.mul_add(59.281_44, -152.548_25), 132.131_08), -42.660_32),
            4.615_392_6,
        ),
        0.135_721_38,
    );
    let g = t.mul_add(
        t.mul_add(
            t.mul_add(t.mul_add(t.mul_add(2.533_77, 4.278_05), -14.185_03), 4.842_96),
            2.194_18,
        ),
        0.091_402_61,
    );
    let b = t.mul_add(
        t.mul_add(
            t.mul_add(t.mul_add(t.mul_add(20.433_88, -82.529_04), 109.996_48), -60.582_04),
            12.641_94,
        ),
        0.106_673_3,
    );
    [
        to_channel(r.clamp(0.0, 1.0) * 255.0),
        to_channel(g.clamp(0.0, 1.0) * 255.0),
        to_channel(b.clamp(0.0, 1.0) * 255.0),
    ]
}
