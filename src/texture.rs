//! Per-stream image slots drawn into the window canvas.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use crate::convert::{frame_to_rgb, DepthRange};
use crate::layout::Rect;
use crate::traits::{Frame, Result};

/// Holds the most recently uploaded image of one stream.
#[derive(Debug, Default)]
pub struct TextureBuffer {
    image: Option<RgbImage>,
}

impl TextureBuffer {
    /// Decode a frame and keep it as the current image.
    pub fn upload(&mut self, frame: &Frame, depth_range: DepthRange) -> Result<()> {
        self.image = Some(frame_to_rgb(frame, depth_range)?);
        Ok(())
    }

    /// Current image, if any frame was uploaded.
    pub const fn image(&self) -> Option<&RgbImage> {
        self.image.as_ref()
    }

    /// Draw the current image into `canvas`, scaled to fit `rect`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn show(&self, canvas: &mut RgbImage, rect: Rect) {
        let Some(image) = &self.image else {
            return;
        };
        let area = rect.fit(image.width(), image.height());
        let width = area.w.floor() as u32;
        let height = area.h.floor() as u32;
        if width == 0 || height == 0 {
            return;
        }

        if (width, height) == image.dimensions() {
            imageops::replace(canvas, image, area.x as i64, area.y as i64);
        } else {
            let scaled = imageops::resize(image, width, height, FilterType::Nearest);
            imageops::replace(canvas, &scaled, area.x as i64, area.y as i64);
        }
    }
}

/// Fill the canvas with black.
pub fn clear(canvas: &mut RgbImage) {
    for pixel in canvas.pixels_mut() {
        *pixel = Rgb([0, 0, 0]);
    }
}
