//! Mock device, hub and window for testing without hardware.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use image::RgbImage;

use crate::traits::{
    CameraError, CaptureStream, DepthDevice, DeviceHub, DeviceInfo, Format, FourCC, Frame,
    FrameMetadata, Result, StreamKind, StreamProfile,
};
use crate::window::{Display, Window};

/// Mock depth camera.
pub struct MockDevice {
    info: DeviceInfo,
    profiles: Vec<StreamProfile>,
    delivered: Cell<usize>,
    opened: Cell<usize>,
    empty_kind: Option<StreamKind>,
    fail_after: Option<usize>,
    disconnect_after: Option<usize>,
    fail_open: bool,
    backlog: usize,
}

impl MockDevice {
    /// Create a device with the given name and no streams.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            info: DeviceInfo {
                name: name.to_owned(),
                driver: "mock".to_owned(),
                bus_info: format!("mock:{name}"),
                nodes: Vec::new(),
            },
            profiles: Vec::new(),
            delivered: Cell::new(0),
            opened: Cell::new(0),
            empty_kind: None,
            fail_after: None,
            disconnect_after: None,
            fail_open: false,
            backlog: 0,
        }
    }

    /// Device with depth, color and infrared streams.
    #[must_use]
    pub fn d400() -> Self {
        Self::new("Mock D400")
            .with_profile(StreamKind::Depth, Format::new(32, 24, FourCC::Z16))
            .with_profile(StreamKind::Color, Format::new(32, 24, FourCC::YUYV))
            .with_profile(StreamKind::Infrared, Format::new(32, 24, FourCC::GREY))
    }

    /// Add a 30 fps stream.
    #[must_use]
    pub fn with_profile(mut self, kind: StreamKind, format: Format) -> Self {
        self.info.nodes.push(format!("mock://{kind}"));
        self.profiles.push(StreamProfile::new(kind, format, 30));
        self
    }

    /// Deliver zero-length frames on `kind`.
    #[must_use]
    pub const fn with_empty_frames(mut self, kind: StreamKind) -> Self {
        self.empty_kind = Some(kind);
        self
    }

    /// Fail every frame request after `frames` frames were delivered.
    #[must_use]
    pub const fn with_failure_after(mut self, frames: usize) -> Self {
        self.fail_after = Some(frames);
        self
    }

    /// Report disconnection once every stream delivered `frames` frames.
    #[must_use]
    pub const fn with_disconnect_after(mut self, frames: usize) -> Self {
        self.disconnect_after = Some(frames);
        self
    }

    /// Have `frames` frames already waiting on every stream when it opens.
    #[must_use]
    pub const fn with_backlog(mut self, frames: usize) -> Self {
        self.backlog = frames;
        self
    }

    /// Fail to open streams.
    #[must_use]
    pub const fn with_open_failure(mut self) -> Self {
        self.fail_open = true;
        self
    }

    fn connected(&self) -> bool {
        let opened = self.opened.get().max(1);
        self.disconnect_after
            .is_none_or(|limit| self.delivered.get() < limit * opened)
    }
}

impl DepthDevice for MockDevice {
    type Stream<'a> = MockStream<'a>;

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn profiles(&self) -> &[StreamProfile] {
        &self.profiles
    }

    fn open(&self, profile: &StreamProfile) -> Result<Self::Stream<'_>> {
        if self.fail_open {
            return Err(CameraError::backend(
                "open",
                format!("{}, {profile}", self.info.name),
                &"device busy",
            ));
        }
        self.opened.set(self.opened.get() + 1);
        Ok(MockStream {
            device: self,
            profile: profile.clone(),
            sequence: 0,
            ready: self.backlog,
        })
    }
}

/// Mock capture stream generating test patterns.
pub struct MockStream<'a> {
    device: &'a MockDevice,
    profile: StreamProfile,
    sequence: u32,
    ready: usize,
}

impl CaptureStream for MockStream<'_> {
    fn profile(&self) -> &StreamProfile {
        &self.profile
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let delivered = self.device.delivered.get();
        if self.device.fail_after.is_some_and(|limit| delivered >= limit) {
            return Err(CameraError::backend(
                "next_frame",
                self.profile.to_string(),
                &"timeout",
            ));
        }
        self.device.delivered.set(delivered + 1);

        let data = if self.device.empty_kind == Some(self.profile.kind) {
            Vec::new()
        } else {
            generate_test_frame(&self.profile.format, self.sequence)
        };

        let sequence = self.sequence;
        self.sequence += 1;

        Ok(Frame {
            kind: self.profile.kind,
            format: self.profile.format.clone(),
            metadata: FrameMetadata {
                sequence,
                timestamp: Duration::from_millis(u64::from(sequence) * 33), // ~30fps
                bytes_used: u32::try_from(data.len()).unwrap_or(u32::MAX),
            },
            data,
        })
    }

    fn try_next_frame(&mut self) -> Result<Option<Frame>> {
        if self.ready == 0 {
            return Ok(None);
        }
        self.ready -= 1;
        self.next_frame().map(Some)
    }
}

/// Generate frame data for the format's pixel layout.
///
/// Formats without a pattern are filled with a level that steps with
/// `sequence`: 64, 80, ... 176, then repeats.
fn generate_test_frame(format: &Format, sequence: u32) -> Vec<u8> {
    let (width, height) = (format.width, format.height);
    match &format.fourcc.0 {
        b"YUYV" => generate_color_bars(width, height),
        b"Z16 " | b"Y16 " => generate_depth_ramp(width, height),
        _ => {
            let size = if format.size > 0 {
                format.size
            } else {
                width * height
            };
            #[allow(clippy::cast_possible_truncation)]
            let level = (64 + (sequence % 8) * 16) as u8;
            vec![level; size as usize]
        }
    }
}

/// YUYV color bars: White, Yellow, Cyan, Green, Magenta, Red, Blue, Black.
fn generate_color_bars(width: u32, height: u32) -> Vec<u8> {
    const BARS: [[u8; 3]; 8] = [
        [235, 128, 128],
        [210, 16, 146],
        [170, 166, 16],
        [145, 54, 34],
        [106, 202, 222],
        [81, 90, 240],
        [41, 240, 110],
        [16, 128, 128],
    ];
    let bar_width = (width / 8).max(1);

    let mut data = Vec::with_capacity((width * height * 2) as usize);
    for _ in 0..height {
        for x in (0..width).step_by(2) {
            let [y, u, v] = BARS
                .get((x / bar_width) as usize)
                .copied()
                .unwrap_or([16, 128, 128]);
            data.extend_from_slice(&[y, u, y, v]);
        }
    }
    data
}

/// Depth increasing left to right from 500 mm to 4500 mm.
fn generate_depth_ramp(width: u32, height: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity((width * height * 2) as usize);
    for _ in 0..height {
        for x in 0..width {
            #[allow(clippy::cast_possible_truncation)]
            let depth = (500 + x * 4000 / width.max(1)) as u16;
            data.extend_from_slice(&depth.to_le_bytes());
        }
    }
    data
}

/// Hub handing out queued mock devices.
#[derive(Default)]
pub struct MockHub {
    devices: VecDeque<MockDevice>,
    waits: usize,
}

impl MockHub {
    /// Hub that yields `devices` in order.
    #[must_use]
    pub fn new(devices: Vec<MockDevice>) -> Self {
        Self {
            devices: devices.into(),
            waits: 0,
        }
    }

    /// Number of `wait_for_device` calls.
    pub const fn waits(&self) -> usize {
        self.waits
    }
}

impl DeviceHub for MockHub {
    type Device = MockDevice;

    fn wait_for_device(&mut self) -> Result<MockDevice> {
        self.waits += 1;
        self.devices.pop_front().ok_or_else(|| {
            CameraError::backend("wait_for_device", String::new(), &"no mock device left")
        })
    }

    fn is_connected(&self, device: &MockDevice) -> bool {
        device.connected()
    }
}

/// What the mock windows saw.
#[derive(Debug, Default)]
pub struct DisplayLog {
    /// Titles of created windows.
    pub titles: Vec<String>,
    /// Frames presented per window.
    pub presented: Vec<usize>,
    /// Windows dropped.
    pub destroyed: usize,
    /// Last canvas shown.
    pub last_canvas: Option<RgbImage>,
}

/// Display creating windows that close after a scheduled number of frames.
pub struct MockDisplay {
    schedule: VecDeque<usize>,
    log: Rc<RefCell<DisplayLog>>,
}

impl MockDisplay {
    /// Window `n` closes after `schedule[n]` frames; later windows never
    /// close on their own.
    #[must_use]
    pub fn new(schedule: Vec<usize>) -> Self {
        Self {
            schedule: schedule.into(),
            log: Rc::default(),
        }
    }

    /// Shared record of window activity.
    #[must_use]
    pub fn log(&self) -> Rc<RefCell<DisplayLog>> {
        Rc::clone(&self.log)
    }
}

impl Display for MockDisplay {
    type Window = MockWindow;

    fn create_window(&mut self, title: &str, width: u32, height: u32) -> Result<MockWindow> {
        let index = {
            let mut log = self.log.borrow_mut();
            log.titles.push(title.to_owned());
            log.presented.push(0);
            log.presented.len() - 1
        };
        Ok(MockWindow {
            index,
            size: (width, height),
            close_after: self.schedule.pop_front().unwrap_or(usize::MAX),
            presented: 0,
            log: Rc::clone(&self.log),
        })
    }
}

/// Mock window.
pub struct MockWindow {
    index: usize,
    size: (u32, u32),
    close_after: usize,
    presented: usize,
    log: Rc<RefCell<DisplayLog>>,
}

impl Window for MockWindow {
    fn should_close(&self) -> bool {
        self.presented >= self.close_after
    }

    fn framebuffer_size(&self) -> Result<(u32, u32)> {
        Ok(self.size)
    }

    fn poll_events(&mut self) -> Result<()> {
        Ok(())
    }

    fn present(&mut self, canvas: &RgbImage) -> Result<()> {
        self.presented += 1;
        let mut log = self.log.borrow_mut();
        if let Some(count) = log.presented.get_mut(self.index) {
            *count = self.presented;
        }
        log.last_canvas = Some(canvas.clone());
        Ok(())
    }
}

impl Drop for MockWindow {
    fn drop(&mut self) {
        self.log.borrow_mut().destroyed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_device_creation() {
        let device = MockDevice::d400();
        assert_eq!(device.info().driver, "mock");
        assert_eq!(device.profiles().len(), 3);
        assert_eq!(device.info().nodes.len(), 3);
    }

    #[test]
    fn test_mock_stream_capture() {
        let device = MockDevice::d400();
        let profile = device.profiles().first().cloned().expect("depth profile");
        let mut stream = device.open(&profile).expect("open should succeed");

        let frame1 = stream.next_frame().expect("next_frame should succeed");
        assert_eq!(frame1.metadata.sequence, 0);
        assert_eq!(frame1.kind, StreamKind::Depth);
        assert_eq!(frame1.data.len(), 32 * 24 * 2);

        let frame2 = stream.next_frame().expect("next_frame should succeed");
        assert_eq!(frame2.metadata.sequence, 1);
    }

    #[test]
    fn test_backlog_is_ready_without_blocking() {
        let device = MockDevice::d400().with_backlog(2);
        let profile = device.profiles().get(2).cloned().expect("infrared profile");
        let mut stream = device.open(&profile).expect("open should succeed");

        let first = stream.try_next_frame().expect("poll succeeds");
        assert_eq!(first.map(|f| f.data.first().copied()), Some(Some(64)));
        let second = stream.try_next_frame().expect("poll succeeds");
        assert_eq!(second.map(|f| f.metadata.sequence), Some(1));
        assert!(stream.try_next_frame().expect("poll succeeds").is_none());
    }

    #[test]
    fn test_color_bars_pattern() {
        let data = generate_color_bars(64, 4);
        assert_eq!(data.len(), 64 * 4 * 2);
        // First bar is white, last is black
        assert_eq!(data.first(), Some(&235));
        assert_eq!(data.get(60 * 2), Some(&16));
    }

    #[test]
    fn test_depth_ramp_pattern() {
        let data = generate_depth_ramp(8, 1);
        let first = data.get(..2).map(|b| u16::from_le_bytes([b[0], b[1]]));
        let last = data.get(14..).map(|b| u16::from_le_bytes([b[0], b[1]]));
        assert_eq!(first, Some(500));
        assert_eq!(last, Some(4000));
    }

    #[test]
    fn test_disconnect_after_frames() {
        let device = MockDevice::d400().with_disconnect_after(1);
        let hub = MockHub::default();
        let profile = device.profiles().first().cloned().expect("depth profile");
        let mut stream = device.open(&profile).expect("open should succeed");

        assert!(hub.is_connected(&device));
        stream.next_frame().expect("next_frame should succeed");
        assert!(!hub.is_connected(&device));
    }

    #[test]
    fn test_mock_window_closes_on_schedule() {
        let mut display = MockDisplay::new(vec![1]);
        let mut window = display.create_window("one", 4, 4).expect("window");
        assert!(!window.should_close());
        window.present(&RgbImage::new(4, 4)).expect("present");
        assert!(window.should_close());
        drop(window);

        let log = display.log();
        assert_eq!(log.borrow().destroyed, 1);
        assert_eq!(log.borrow().presented, vec![1]);
    }
}
