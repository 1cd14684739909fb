//! Depth-Capture: show every stream of a depth camera in a tiled window
//!
//! This library provides trait-based abstractions over multi-sensor depth
//! cameras, enabling both production use with V4L2 hardware and testing with
//! mock devices. The [`session`] loop waits for a camera, streams it into a
//! window and starts over when the camera goes away.

pub mod config;
pub mod convert;
pub mod device;
#[cfg(feature = "highgui")]
pub mod highgui;
pub mod layout;
pub mod profile;
pub mod session;
pub mod sync;
pub mod texture;
pub mod traits;
pub mod viewer;
pub mod window;

#[cfg(test)]
pub mod mock;

pub use config::ViewerConfig;
pub use device::{V4l2Device, V4l2Hub};
pub use layout::{Grid, Rect};
pub use profile::{Preset, StreamConfig, StreamRequest};
pub use session::{run, RunSummary};
pub use sync::{FrameQueue, Syncer};
pub use traits::{
    CameraError, CaptureStream, DepthDevice, DeviceHub, DeviceInfo, Format, FourCC, Frame,
    FrameBundle, FrameMetadata, StreamKind, StreamProfile,
};
pub use viewer::TileView;
pub use window::{Display, Window};
