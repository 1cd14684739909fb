//! OpenCV HighGUI window backend.

use image::RgbImage;
use opencv::core::{Mat, Scalar, CV_8UC3};
use opencv::highgui;
use opencv::prelude::*;
use tracing::{debug, warn};

use crate::traits::{CameraError, Result};
use crate::window::{Display, Window};

const KEY_ESCAPE: i32 = 27;
const KEY_Q: i32 = b'q' as i32;

impl From<opencv::Error> for CameraError {
    fn from(err: opencv::Error) -> Self {
        Self::Window(err.to_string())
    }
}

/// Creates HighGUI windows.
#[derive(Debug, Default)]
pub struct HighGuiDisplay;

impl Display for HighGuiDisplay {
    type Window = HighGuiWindow;

    fn create_window(&mut self, title: &str, width: u32, height: u32) -> Result<HighGuiWindow> {
        highgui::named_window(title, highgui::WINDOW_NORMAL)?;
        highgui::resize_window(title, to_i32(width), to_i32(height))?;
        debug!(%title, width, height, "Window created");
        Ok(HighGuiWindow {
            name: title.to_owned(),
            size: (width, height),
            frame: Mat::default(),
            closed: false,
        })
    }
}

/// A HighGUI window; destroyed on drop.
pub struct HighGuiWindow {
    name: String,
    size: (u32, u32),
    frame: Mat,
    closed: bool,
}

impl Window for HighGuiWindow {
    fn should_close(&self) -> bool {
        self.closed
    }

    #[allow(clippy::cast_sign_loss)]
    fn framebuffer_size(&self) -> Result<(u32, u32)> {
        let rect = highgui::get_window_image_rect(&self.name)?;
        // Before the first frame is shown the rect can be empty.
        if rect.width > 0 && rect.height > 0 {
            Ok((rect.width as u32, rect.height as u32))
        } else {
            Ok(self.size)
        }
    }

    fn poll_events(&mut self) -> Result<()> {
        let key = highgui::wait_key(1)?;
        if key == KEY_ESCAPE || key == KEY_Q {
            self.closed = true;
        }
        if highgui::get_window_property(&self.name, highgui::WND_PROP_VISIBLE)? < 1.0 {
            self.closed = true;
        }
        Ok(())
    }

    fn present(&mut self, canvas: &RgbImage) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let (width, height) = canvas.dimensions();
        if self.frame.cols() != to_i32(width) || self.frame.rows() != to_i32(height) {
            self.frame = Mat::new_rows_cols_with_default(
                to_i32(height),
                to_i32(width),
                CV_8UC3,
                Scalar::all(0.0),
            )?;
        }

        // OpenCV expects BGR.
        let bytes = self.frame.data_bytes_mut()?;
        for (dst, src) in bytes.chunks_exact_mut(3).zip(canvas.pixels()) {
            let [r, g, b] = src.0;
            dst.copy_from_slice(&[b, g, r]);
        }

        highgui::imshow(&self.name, &self.frame)?;
        Ok(())
    }
}

impl Drop for HighGuiWindow {
    fn drop(&mut self) {
        log_failure(
            &self.name,
            "Failed to destroy window",
            highgui::destroy_window(&self.name),
        );
        // Let HighGUI process the destroy event.
        log_failure(
            &self.name,
            "Failed to process window events",
            highgui::wait_key(1),
        );
    }
}

/// Log a HighGUI call whose error cannot be propagated.
fn log_failure<T>(window: &str, action: &str, result: opencv::Result<T>) -> Option<T> {
    result
        .map_err(|err| warn!(%window, error = %err, "{action}"))
        .ok()
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
