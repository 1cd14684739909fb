//! The device/session loop: wait for a camera, stream it into a window,
//! start over when it goes away.

use image::RgbImage;
use tracing::{error, info, warn};

use crate::config::ViewerConfig;
use crate::sync::{FrameQueue, Syncer};
use crate::traits::{CameraError, DepthDevice, DeviceHub, Result};
use crate::viewer::TileView;
use crate::window::{Display, Window};

/// Why a connection cycle ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The user closed the window.
    WindowClosed,
    /// The device went away.
    Disconnected,
}

/// Counters of a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Connection cycles started.
    pub sessions: usize,
    /// Errors reported and recovered from.
    pub errors: usize,
}

/// Run connection cycles until the user closes the window.
///
/// Errors never end the run; they are logged and the next cycle waits for a
/// device again.
pub fn run<H, D>(hub: &mut H, display: &mut D, config: &ViewerConfig) -> RunSummary
where
    H: DeviceHub,
    D: Display,
{
    let mut summary = RunSummary::default();
    let mut finished = false;

    while !finished {
        summary.sessions += 1;
        match run_session(hub, display, config) {
            Ok(SessionEnd::WindowClosed) => finished = true,
            Ok(SessionEnd::Disconnected) => warn!("Device disconnected, waiting for a new one"),
            Err(err) => {
                summary.errors += 1;
                report(&err);
            }
        }
    }

    info!(
        sessions = summary.sessions,
        errors = summary.errors,
        "Window closed"
    );
    summary
}

fn report(err: &CameraError) {
    match err {
        CameraError::Backend {
            function,
            args,
            message,
        } => error!("Device error calling {function}({args}):\n    {message}"),
        other => error!("{other}"),
    }
}

/// One connection cycle. The window and streams are dropped on return.
pub fn run_session<H, D>(hub: &mut H, display: &mut D, config: &ViewerConfig) -> Result<SessionEnd>
where
    H: DeviceHub,
    D: Display,
{
    let device = hub.wait_for_device()?;

    let streams = config.stream_config().open(&device)?;
    let mut syncer = Syncer::new(streams);
    let mut queue = FrameQueue::with_capacity(config.queue_capacity);
    let mut view = TileView::new(config.depth_range());

    let title = format!("Depth Capture ({})", device.info().name);
    let mut window = display.create_window(&title, config.width, config.height)?;
    info!(%title, streams = syncer.stream_count(), "Streaming");

    let mut canvas = RgbImage::new(0, 0);
    while hub.is_connected(&device) && !window.should_close() {
        let (width, height) = window.framebuffer_size()?;
        if canvas.dimensions() != (width, height) {
            canvas = RgbImage::new(width, height);
        }

        let bundle = queue.wait_for_frames(&mut syncer)?;
        view.ingest(bundle)?;

        window.poll_events()?;
        view.render(&mut canvas);
        window.present(&canvas)?;
    }

    Ok(if window.should_close() {
        SessionEnd::WindowClosed
    } else {
        SessionEnd::Disconnected
    })
}
