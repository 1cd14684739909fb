//! Core traits and types for the depth camera abstraction.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Kind of data carried by a stream.
///
/// Declaration order is the slot order used for tiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, clap::ValueEnum)]
pub enum StreamKind {
    /// 16-bit depth in millimetres.
    Depth,
    /// Colour image.
    Color,
    /// Infrared intensity image.
    Infrared,
}

impl StreamKind {
    /// Number of stream kinds, i.e. the number of texture slots.
    pub const COUNT: usize = 3;

    /// All kinds in slot order.
    pub const ALL: [Self; Self::COUNT] = [Self::Depth, Self::Color, Self::Infrared];

    /// Slot index of this kind.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Lowercase display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Depth => "depth",
            Self::Color => "color",
            Self::Infrared => "infrared",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pixel format representation (e.g., YUYV, Z16, GREY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
    /// UYVY pixel format (4:2:2 packed, chroma first).
    pub const UYVY: Self = Self::new(b"UYVY");
    /// RGB3 pixel format (24-bit RGB).
    pub const RGB3: Self = Self::new(b"RGB3");
    /// BGR3 pixel format (24-bit BGR).
    pub const BGR3: Self = Self::new(b"BGR3");
    /// MJPEG pixel format (Motion JPEG).
    pub const MJPG: Self = Self::new(b"MJPG");
    /// 8-bit greyscale.
    pub const GREY: Self = Self::new(b"GREY");
    /// Interleaved 8-bit left/right infrared pair.
    pub const Y8I: Self = Self::new(b"Y8I ");
    /// 16-bit depth.
    pub const Z16: Self = Self::new(b"Z16 ");
    /// 16-bit greyscale, used by some sensors for depth.
    pub const Y16: Self = Self::new(b"Y16 ");

    /// Bytes per pixel for uncompressed formats this crate can decode.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> Option<u32> {
        match &self.0 {
            b"GREY" => Some(1),
            b"YUYV" | b"UYVY" | b"Y8I " | b"Z16 " | b"Y16 " => Some(2),
            b"RGB3" | b"BGR3" => Some(3),
            _ => None,
        }
    }

    /// Whether frames of this format are variable-size compressed images.
    #[must_use]
    pub fn is_compressed(self) -> bool {
        self == Self::MJPG
    }

    /// The stream kind a node delivering this format carries, if known.
    ///
    /// `Y16` is ambiguous: it is raw depth on ToF sensors but calibration
    /// infrared on stereo cameras, see [`Self::stream_kind_among`].
    #[must_use]
    pub fn stream_kind(self) -> Option<StreamKind> {
        match &self.0 {
            b"Z16 " | b"Y16 " => Some(StreamKind::Depth),
            b"GREY" | b"Y8I " => Some(StreamKind::Infrared),
            b"YUYV" | b"UYVY" | b"RGB3" | b"BGR3" | b"MJPG" => Some(StreamKind::Color),
            _ => None,
        }
    }

    /// Stream kind of this format on a node offering all of `siblings`.
    ///
    /// `Y16` next to 8-bit infrared formats is infrared.
    #[must_use]
    pub fn stream_kind_among(self, siblings: &[Self]) -> Option<StreamKind> {
        let kind = self.stream_kind()?;
        if self == Self::Y16
            && siblings
                .iter()
                .any(|&f| f != Self::Y16 && f.stream_kind() == Some(StreamKind::Infrared))
        {
            return Some(StreamKind::Infrared);
        }
        Some(kind)
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(String::from_utf8_lossy(&self.0).trim_end())
    }
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

/// Video format specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Bytes per line (stride). Zero for compressed formats.
    pub stride: u32,
    /// Total frame size in bytes. Zero for compressed formats.
    pub size: u32,
}

impl Format {
    /// Create a new format specification with a tightly packed stride.
    #[must_use]
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        let stride = match fourcc.bytes_per_pixel() {
            Some(bpp) => width * bpp,
            None => 0,
        };
        Self {
            width,
            height,
            fourcc,
            stride,
            size: stride * height,
        }
    }

    /// Number of pixels in one frame.
    #[must_use]
    pub const fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} {}", self.width, self.height, self.fourcc)
    }
}

/// One way a device can deliver a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamProfile {
    /// Stream kind.
    pub kind: StreamKind,
    /// Image format.
    pub format: Format,
    /// Frames per second.
    pub fps: u32,
}

impl StreamProfile {
    /// Create a new profile.
    #[must_use]
    pub const fn new(kind: StreamKind, format: Format, fps: u32) -> Self {
        Self { kind, format, fps }
    }
}

impl fmt::Display for StreamProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} @ {}fps", self.kind, self.format, self.fps)
    }
}

/// Identification of a connected device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Product name.
    pub name: String,
    /// Driver name.
    pub driver: String,
    /// Bus information shared by all of the device's nodes.
    pub bus_info: String,
    /// Device node paths, one per sensor.
    pub nodes: Vec<String>,
}

/// Metadata for a captured frame.
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    /// Frame sequence number.
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
    /// Actual bytes used in the frame buffer.
    pub bytes_used: u32,
}

/// A captured frame of one stream.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Stream kind that produced the frame.
    pub kind: StreamKind,
    /// Frame format.
    pub format: Format,
    /// Raw frame data.
    pub data: Vec<u8>,
    /// Frame metadata.
    pub metadata: FrameMetadata,
}

/// Frames from different streams aligned to the same instant.
#[derive(Debug, Clone, Default)]
pub struct FrameBundle {
    frames: Vec<Frame>,
}

impl FrameBundle {
    /// Create an empty bundle.
    #[must_use]
    pub const fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Add a frame.
    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Number of frames in the bundle.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the bundle holds no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Sort frames by stream kind for stable tile ordering.
    pub fn sort_by_kind(&mut self) {
        self.frames.sort_by_key(|frame| frame.kind);
    }

    /// Iterate over the frames.
    pub fn iter(&self) -> std::slice::Iter<'_, Frame> {
        self.frames.iter()
    }
}

impl FromIterator<Frame> for FrameBundle {
    fn from_iter<I: IntoIterator<Item = Frame>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for FrameBundle {
    type Item = Frame;
    type IntoIter = std::vec::IntoIter<Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.into_iter()
    }
}

impl<'a> IntoIterator for &'a FrameBundle {
    type Item = &'a Frame;
    type IntoIter = std::slice::Iter<'a, Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

/// Error type for camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// A device-layer call failed.
    #[error("{function}({args}): {message}")]
    Backend {
        /// Name of the failed operation.
        function: &'static str,
        /// Arguments the operation was called with.
        args: String,
        /// Underlying error message.
        message: String,
    },
    /// Frame format cannot be decoded.
    #[error("Format not supported: {0}")]
    FormatNotSupported(FourCC),
    /// Frame holds fewer bytes than its format requires.
    #[error("Frame too short for {format}: expected {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Declared frame format.
        format: Format,
        /// Required byte count.
        expected: usize,
        /// Actual byte count.
        actual: usize,
    },
    /// An explicit stream request matched no profile.
    #[error("No {0} profile matches the request")]
    ProfileNotFound(StreamKind),
    /// Nothing left to stream after applying the configuration.
    #[error("No streams enabled")]
    NoStreams,
    /// Device does not provide the requested stream.
    #[error("Device has no {0} stream")]
    StreamUnavailable(StreamKind),
    /// Window creation or presentation failed.
    #[error("Window error: {0}")]
    Window(String),
    /// Compressed frame could not be decoded.
    #[error("Image decode error: {0}")]
    Decode(#[from] image::ImageError),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CameraError {
    /// Build a device-layer error for a failed call.
    pub fn backend<E: fmt::Display>(function: &'static str, args: String, err: &E) -> Self {
        Self::Backend {
            function,
            args,
            message: err.to_string(),
        }
    }
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;

/// Abstraction over an opened stream.
pub trait CaptureStream {
    /// Profile the stream was opened with.
    fn profile(&self) -> &StreamProfile;

    /// Capture the next frame from the stream.
    fn next_frame(&mut self) -> Result<Frame>;

    /// Capture a frame only if one is already waiting; never blocks.
    fn try_next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Abstraction over a multi-sensor depth camera.
pub trait DepthDevice {
    /// The stream type returned by `open`.
    type Stream<'a>: CaptureStream
    where
        Self: 'a;

    /// Get device identification.
    fn info(&self) -> &DeviceInfo;

    /// All profiles the device supports.
    fn profiles(&self) -> &[StreamProfile];

    /// Open one stream with the given profile.
    fn open(&self, profile: &StreamProfile) -> Result<Self::Stream<'_>>;
}

/// Abstraction over device discovery.
pub trait DeviceHub {
    /// Device type produced by the hub.
    type Device: DepthDevice;

    /// Block until a compatible device is available.
    fn wait_for_device(&mut self) -> Result<Self::Device>;

    /// Whether the device is still connected.
    fn is_connected(&self, device: &Self::Device) -> bool;
}
