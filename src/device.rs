//! V4L2 device implementation using the v4l crate.
//!
//! A depth camera shows up as several capture nodes (depth, infrared, color)
//! sharing one bus id. Nodes are grouped by bus id into one [`V4l2Device`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::capability::Flags;
use v4l::frameinterval::FrameIntervalEnum;
use v4l::framesize::FrameSizeEnum;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream as V4lCaptureStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::Device;

use crate::config::ViewerConfig;
use crate::traits::{
    CameraError, CaptureStream, DepthDevice, DeviceHub, DeviceInfo, Format, FourCC, Frame,
    FrameMetadata, Result, StreamKind, StreamProfile,
};

/// Frame rate assumed when the driver does not report discrete intervals.
const FALLBACK_FPS: u32 = 30;

/// One capture node of a device.
#[derive(Debug, Clone)]
struct Node {
    path: String,
    kind: StreamKind,
    card: String,
    driver: String,
    bus_info: String,
    profiles: Vec<StreamProfile>,
}

/// A depth camera made of V4L2 capture nodes on one bus.
#[derive(Debug, Clone)]
pub struct V4l2Device {
    info: DeviceInfo,
    nodes: Vec<Node>,
    profiles: Vec<StreamProfile>,
    buffer_count: u32,
}

impl V4l2Device {
    fn from_nodes(nodes: Vec<Node>, buffer_count: u32) -> Option<Self> {
        let first = nodes.first()?;
        let info = DeviceInfo {
            name: first.card.clone(),
            driver: first.driver.clone(),
            bus_info: first.bus_info.clone(),
            nodes: nodes.iter().map(|node| node.path.clone()).collect(),
        };
        let profiles = nodes
            .iter()
            .flat_map(|node| node.profiles.iter().cloned())
            .collect();
        Some(Self {
            info,
            nodes,
            profiles,
            buffer_count,
        })
    }

    /// Whether the device has a node of `kind`.
    pub fn has_stream(&self, kind: StreamKind) -> bool {
        self.nodes.iter().any(|node| node.kind == kind)
    }
}

impl DepthDevice for V4l2Device {
    type Stream<'a> = V4l2Stream<'a>;

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn profiles(&self) -> &[StreamProfile] {
        &self.profiles
    }

    fn open(&self, profile: &StreamProfile) -> Result<Self::Stream<'_>> {
        let node = self
            .nodes
            .iter()
            .find(|node| node.kind == profile.kind)
            .ok_or(CameraError::StreamUnavailable(profile.kind))?;

        let device = Device::with_path(&node.path)
            .map_err(|err| CameraError::backend("open", node.path.clone(), &err))?;

        let mut fmt = device
            .format()
            .map_err(|err| CameraError::backend("get_format", node.path.clone(), &err))?;
        fmt.width = profile.format.width;
        fmt.height = profile.format.height;
        fmt.fourcc = profile.format.fourcc.into();

        let fmt = device.set_format(&fmt).map_err(|err| {
            CameraError::backend("set_format", format!("{}, {}", node.path, profile.format), &err)
        })?;

        let format = Format {
            width: fmt.width,
            height: fmt.height,
            fourcc: FourCC::from(fmt.fourcc),
            stride: fmt.stride,
            size: fmt.size,
        };
        if format.width != profile.format.width
            || format.height != profile.format.height
            || format.fourcc != profile.format.fourcc
        {
            warn!(
                path = %node.path,
                requested = %profile.format,
                actual = %format,
                "Driver adjusted the requested format"
            );
        }

        let fps = match device.set_params(&Parameters::with_fps(profile.fps)) {
            Ok(params) if params.interval.numerator > 0 => {
                params.interval.denominator / params.interval.numerator
            }
            Ok(_) => profile.fps,
            Err(err) => {
                warn!(path = %node.path, fps = profile.fps, error = %err, "Could not set frame rate");
                profile.fps
            }
        };

        let stream = Stream::with_buffers(&device, Type::VideoCapture, self.buffer_count)
            .map_err(|err| {
                CameraError::backend(
                    "start_stream",
                    format!("{}, {} buffers", node.path, self.buffer_count),
                    &err,
                )
            })?;

        debug!(path = %node.path, %format, fps, "Stream started");

        Ok(V4l2Stream {
            path: node.path.clone(),
            profile: StreamProfile::new(profile.kind, format, fps),
            stream,
            started: false,
        })
    }
}

/// V4L2 capture stream wrapping mmap-based streaming.
pub struct V4l2Stream<'a> {
    path: String,
    profile: StreamProfile,
    stream: Stream<'a>,
    started: bool,
}

impl CaptureStream for V4l2Stream<'_> {
    fn profile(&self) -> &StreamProfile {
        &self.profile
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|err| CameraError::backend("next_frame", self.path.clone(), &err))?;
        self.started = true;

        // V4L2 timestamps are always non-negative in practice
        #[allow(clippy::cast_sign_loss)]
        let secs = meta.timestamp.sec.max(0) as u64;
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let nanos = (meta.timestamp.usec.max(0) as u32).saturating_mul(1000);

        let used = meta.bytesused as usize;
        let data = match buf.get(..used) {
            Some(payload) if used > 0 => payload.to_vec(),
            _ => buf.to_vec(),
        };

        Ok(Frame {
            kind: self.profile.kind,
            format: self.profile.format.clone(),
            data,
            metadata: FrameMetadata {
                sequence: meta.sequence,
                timestamp: Duration::new(secs, nanos),
                bytes_used: meta.bytesused,
            },
        })
    }

    fn try_next_frame(&mut self) -> Result<Option<Frame>> {
        // Buffers are only queued by the first blocking read.
        if !self.started {
            return Ok(None);
        }
        // A zero-timeout DQBUF through `next` would requeue the held buffer
        // twice on timeout, so ask the fd first.
        let ready = self
            .stream
            .handle()
            .poll(libc::POLLIN, 0)
            .map_err(|err| CameraError::backend("poll", self.path.clone(), &err))?;
        if ready == 0 {
            return Ok(None);
        }
        self.next_frame().map(Some)
    }
}

/// Discovers depth cameras among `/dev/video*` nodes.
#[derive(Debug, Clone)]
pub struct V4l2Hub {
    dev_dir: PathBuf,
    poll_interval: Duration,
    any_camera: bool,
    buffer_count: u32,
}

impl V4l2Hub {
    /// Create a hub scanning `/dev` with the given configuration.
    pub fn new(config: &ViewerConfig) -> Self {
        Self {
            dev_dir: PathBuf::from("/dev"),
            poll_interval: config.poll_interval(),
            any_camera: config.any_camera,
            buffer_count: config.buffers,
        }
    }

    /// All devices currently present, compatible or not.
    pub fn enumerate(&self) -> Result<Vec<V4l2Device>> {
        let entries = std::fs::read_dir(&self.dev_dir).map_err(|err| {
            CameraError::backend("enumerate", self.dev_dir.display().to_string(), &err)
        })?;

        let mut paths: Vec<(u32, PathBuf)> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                let index = path.file_name()?.to_str().and_then(video_index)?;
                Some((index, path))
            })
            .collect();
        paths.sort_by_key(|(index, _)| *index);

        let mut by_bus: BTreeMap<String, Vec<Node>> = BTreeMap::new();
        for (_, path) in paths {
            let Some(node) = probe_node(&path) else {
                continue;
            };
            let nodes = by_bus.entry(node.bus_info.clone()).or_default();
            if nodes.iter().any(|existing| existing.kind == node.kind) {
                debug!(path = %node.path, kind = %node.kind, "Skipping additional node of same kind");
                continue;
            }
            nodes.push(node);
        }

        Ok(by_bus
            .into_values()
            .filter_map(|nodes| V4l2Device::from_nodes(nodes, self.buffer_count))
            .collect())
    }

    fn is_compatible(&self, device: &V4l2Device) -> bool {
        self.any_camera || device.has_stream(StreamKind::Depth)
    }
}

impl DeviceHub for V4l2Hub {
    type Device = V4l2Device;

    fn wait_for_device(&mut self) -> Result<V4l2Device> {
        let mut announced = false;
        loop {
            if let Some(device) = self
                .enumerate()?
                .into_iter()
                .find(|device| self.is_compatible(device))
            {
                info!(
                    name = %device.info.name,
                    bus = %device.info.bus_info,
                    nodes = ?device.info.nodes,
                    "Found depth camera"
                );
                return Ok(device);
            }

            if !announced {
                info!(dir = %self.dev_dir.display(), "Waiting for a depth camera");
                announced = true;
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    fn is_connected(&self, device: &V4l2Device) -> bool {
        device
            .info
            .nodes
            .iter()
            .all(|path| Path::new(path).exists())
    }
}

/// Open a node and describe it, or `None` if it is not a usable capture node.
fn probe_node(path: &Path) -> Option<Node> {
    let path_str = path.to_string_lossy().into_owned();
    let device = match Device::with_path(path) {
        Ok(device) => device,
        Err(err) => {
            debug!(path = %path_str, error = %err, "Cannot open node");
            return None;
        }
    };

    let caps = device.query_caps().ok()?;
    if !caps.capabilities.contains(Flags::VIDEO_CAPTURE)
        || !caps.capabilities.contains(Flags::STREAMING)
    {
        return None;
    }

    let fourccs: Vec<FourCC> = device
        .enum_formats()
        .into_iter()
        .flatten()
        .map(|desc| FourCC::from(desc.fourcc))
        .collect();
    let kind = classify(&fourccs)?;

    let mut profiles = Vec::new();
    // Formats of another kind (e.g. calibration color on an infrared node)
    // cannot be opened as this node's stream.
    let node_formats = fourccs
        .iter()
        .copied()
        .filter(|f| f.stream_kind_among(&fourccs) == Some(kind));
    for fourcc in node_formats {
        for (width, height) in frame_sizes(&device, fourcc) {
            for fps in frame_rates(&device, fourcc, width, height) {
                profiles.push(StreamProfile::new(
                    kind,
                    Format::new(width, height, fourcc),
                    fps,
                ));
            }
        }
    }

    debug!(
        path = %path_str,
        %kind,
        card = %caps.card,
        bus = %caps.bus,
        profiles = profiles.len(),
        "Probed capture node"
    );

    Some(Node {
        path: path_str,
        kind,
        card: caps.card,
        driver: caps.driver,
        bus_info: caps.bus,
        profiles,
    })
}

fn frame_sizes(device: &Device, fourcc: FourCC) -> Vec<(u32, u32)> {
    device
        .enum_framesizes(fourcc.into())
        .into_iter()
        .flatten()
        .map(|size| match size.size {
            FrameSizeEnum::Discrete(discrete) => (discrete.width, discrete.height),
            FrameSizeEnum::Stepwise(step) => (step.max_width, step.max_height),
        })
        .collect()
}

fn frame_rates(device: &Device, fourcc: FourCC, width: u32, height: u32) -> Vec<u32> {
    let mut rates: Vec<u32> = device
        .enum_frameintervals(fourcc.into(), width, height)
        .into_iter()
        .flatten()
        .filter_map(|interval| match interval.interval {
            FrameIntervalEnum::Discrete(frac) => {
                fps_from_interval(frac.numerator, frac.denominator)
            }
            FrameIntervalEnum::Stepwise(_) => None,
        })
        .collect();
    rates.sort_unstable();
    rates.dedup();
    if rates.is_empty() {
        rates.push(FALLBACK_FPS);
    }
    rates
}

/// Frames per second of a `numerator/denominator` second interval.
fn fps_from_interval(numerator: u32, denominator: u32) -> Option<u32> {
    (numerator > 0).then(|| denominator / numerator).filter(|&fps| fps > 0)
}

/// Stream kind of a node from the formats it offers; depth wins over
/// infrared, infrared over color. `Y16` next to infrared formats is infrared.
fn classify(fourccs: &[FourCC]) -> Option<StreamKind> {
    fourccs
        .iter()
        .filter_map(|fourcc| fourcc.stream_kind_among(fourccs))
        .min()
}

/// Index of a `videoN` device name.
fn video_index(name: &str) -> Option<u32> {
    name.strip_prefix("video")?.parse().ok()
}
