//! Command-line configuration of the viewer.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::convert::DepthRange;
use crate::profile::{Preset, StreamConfig};
use crate::sync::DEFAULT_QUEUE_CAPACITY;
use crate::traits::StreamKind;

/// Default window width.
pub const DEFAULT_WIDTH: u32 = 1280;
/// Default window height.
pub const DEFAULT_HEIGHT: u32 = 720;
/// Default mmap buffers per stream.
pub const DEFAULT_BUFFERS: u32 = 4;
/// Default device polling interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Viewer options.
#[derive(Debug, Clone, Parser)]
#[command(name = "depth-capture")]
#[command(about = "Show every stream of a depth camera in a tiled window")]
#[command(version)]
pub struct ViewerConfig {
    /// Initial window width
    #[arg(long, default_value_t = DEFAULT_WIDTH)]
    pub width: u32,

    /// Initial window height
    #[arg(long, default_value_t = DEFAULT_HEIGHT)]
    pub height: u32,

    /// Profile preference when enabling all streams
    #[arg(long, value_enum, default_value_t = Preset::BestQuality)]
    pub preset: Preset,

    /// Stream kind to leave disabled (repeatable)
    #[arg(long = "disable", value_enum)]
    pub disabled: Vec<StreamKind>,

    /// Memory-mapped buffers per stream
    #[arg(long, default_value_t = DEFAULT_BUFFERS)]
    pub buffers: u32,

    /// Frame bundles kept between capture and display; 1 shows only the newest
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Interval between device scans while waiting for a camera
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,

    /// Accept cameras without a depth stream
    #[arg(long)]
    pub any_camera: bool,

    /// Depth mapped to the near end of the colormap (auto if unset)
    #[arg(long)]
    pub depth_min_mm: Option<u16>,

    /// Depth mapped to the far end of the colormap (auto if unset)
    #[arg(long)]
    pub depth_max_mm: Option<u16>,

    /// Also write debug logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            preset: Preset::default(),
            disabled: Vec::new(),
            buffers: DEFAULT_BUFFERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            any_camera: false,
            depth_min_mm: None,
            depth_max_mm: None,
            log_file: None,
        }
    }
}

impl ViewerConfig {
    /// Stream configuration: everything at the preset, minus disabled kinds.
    pub fn stream_config(&self) -> StreamConfig {
        let mut config = StreamConfig::new();
        config.enable_all(self.preset);
        for &kind in &self.disabled {
            config.disable_stream(kind);
        }
        config
    }

    /// Depth colormap range.
    pub const fn depth_range(&self) -> DepthRange {
        DepthRange {
            min_mm: self.depth_min_mm,
            max_mm: self.depth_max_mm,
        }
    }

    /// Device polling interval.
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
