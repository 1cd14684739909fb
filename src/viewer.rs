//! Tiled display of frame bundles, one slot per stream kind.

use image::RgbImage;
use tracing::debug;

use crate::convert::DepthRange;
use crate::layout::Grid;
use crate::texture::{self, TextureBuffer};
use crate::traits::{FrameBundle, Result, StreamKind};

/// Render state of one connection cycle.
#[derive(Debug, Default)]
pub struct TileView {
    buffers: [TextureBuffer; StreamKind::COUNT],
    active: [bool; StreamKind::COUNT],
    max_frames: usize,
    depth_range: DepthRange,
}

impl TileView {
    /// Create an empty view colorizing depth with `depth_range`.
    #[must_use]
    pub fn new(depth_range: DepthRange) -> Self {
        Self {
            depth_range,
            ..Self::default()
        }
    }

    /// Largest bundle seen so far.
    pub const fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// Grid the next draw will use.
    pub const fn grid(&self) -> Grid {
        Grid::for_frame_count(self.max_frames)
    }

    /// Whether a frame of `kind` has been shown.
    pub fn is_active(&self, kind: StreamKind) -> bool {
        self.active.get(kind.index()).copied().unwrap_or(false)
    }

    /// Texture slot of `kind`.
    pub fn texture(&self, kind: StreamKind) -> Option<&TextureBuffer> {
        self.buffers.get(kind.index())
    }

    /// Upload every frame of the bundle into its kind's slot.
    pub fn ingest(&mut self, mut bundle: FrameBundle) -> Result<()> {
        if bundle.len() > self.max_frames {
            debug!(
                previous = self.max_frames,
                frames = bundle.len(),
                "Growing tile grid"
            );
            self.max_frames = bundle.len();
        }

        bundle.sort_by_kind();

        for frame in &bundle {
            let slot = frame.kind.index();
            if let (Some(buffer), Some(active)) =
                (self.buffers.get_mut(slot), self.active.get_mut(slot))
            {
                buffer.upload(frame, self.depth_range)?;
                *active = true;
            }
        }

        Ok(())
    }

    /// Draw active slots into sequential grid cells covering the canvas.
    pub fn render(&self, canvas: &mut RgbImage) {
        texture::clear(canvas);

        let grid = self.grid();
        let (width, height) = canvas.dimensions();
        let active = self
            .buffers
            .iter()
            .zip(self.active)
            .filter_map(|(buffer, active)| active.then_some(buffer));

        for (index, buffer) in active.enumerate() {
            buffer.show(canvas, grid.cell(index, width, height));
        }
    }
}
