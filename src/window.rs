//! Window abstraction used by the render loop.

use image::RgbImage;

use crate::traits::Result;

/// An open window showing one canvas per iteration.
///
/// Dropping the window destroys it.
pub trait Window {
    /// Whether the user asked to close the window.
    fn should_close(&self) -> bool;

    /// Current drawable size in pixels.
    fn framebuffer_size(&self) -> Result<(u32, u32)>;

    /// Process pending window events.
    fn poll_events(&mut self) -> Result<()>;

    /// Show `canvas` in the window.
    fn present(&mut self, canvas: &RgbImage) -> Result<()>;
}

/// Factory for windows.
pub trait Display {
    /// Window type created by this display.
    type Window: Window;

    /// Open a window with the given title and initial size.
    fn create_window(&mut self, title: &str, width: u32, height: u32) -> Result<Self::Window>;
}
