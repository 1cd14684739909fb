//! Square-ish grid layout for stream tiles.

/// Axis-aligned rectangle in window pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width.
    pub w: f32,
    /// Height.
    pub h: f32,
}

impl Rect {
    /// Create a new rectangle.
    #[must_use]
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Largest rectangle with the given aspect ratio that fits inside this
    /// one, centred.
    #[must_use]
    pub fn fit(&self, width: u32, height: u32) -> Self {
        if width == 0 || height == 0 {
            return Self::new(self.x, self.y, 0.0, 0.0);
        }
        #[allow(clippy::cast_precision_loss)]
        let aspect = width as f32 / height as f32;
        let (w, h) = if self.w / self.h > aspect {
            (self.h * aspect, self.h)
        } else {
            (self.w, self.w / aspect)
        };
        Self::new(
            self.x + (self.w - w) / 2.0,
            self.y + (self.h - h) / 2.0,
            w,
            h,
        )
    }
}

/// Tile grid sized for the largest bundle seen so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    /// Tiles per row.
    pub columns: usize,
    /// Tiles per column.
    pub rows: usize,
}

impl Grid {
    /// Grid for `count` tiles: `ceil(sqrt(count))` columns and as many rows
    /// as needed. An empty grid is laid out as a single cell.
    #[must_use]
    pub const fn for_frame_count(count: usize) -> Self {
        if count == 0 {
            return Self {
                columns: 1,
                rows: 1,
            };
        }
        let mut columns = 1;
        while columns * columns < count {
            columns += 1;
        }
        Self {
            columns,
            rows: count.div_ceil(columns),
        }
    }

    /// Rectangle of the `index`th cell within a `width` x `height` area.
    /// Cells fill row by row.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cell(&self, index: usize, width: u32, height: u32) -> Rect {
        let tile_w = width as f32 / self.columns as f32;
        let tile_h = height as f32 / self.rows as f32;
        let column = index % self.columns;
        let row = index / self.columns;
        Rect::new(column as f32 * tile_w, row as f32 * tile_h, tile_w, tile_h)
    }
}
