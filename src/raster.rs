//! In-memory raster buffer and grid geometry.
//!
//! A [`Raster`] is a row-major `f32` buffer plus the [`GridGeometry`] that
//! maps (row, col) indices to world coordinates. Geometry is immutable: a new
//! raster gets a new geometry, existing ones are never edited in place.

/// No-data sentinel used by every stage of the pipeline.
pub const NODATA: f32 = -9999.0;

/// Affine grid geometry for a north-up raster with square pixels.
///
/// Equivalent to the GDAL geotransform
/// `(origin_x, pixel_size, 0, origin_y, 0, -pixel_size)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridGeometry {
    /// X coordinate of the upper-left corner of pixel (0, 0).
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner of pixel (0, 0).
    pub origin_y: f64,
    /// Cell size in map units, uniform in x and y.
    pub pixel_size: f64,
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
}

/// Outer bounds of a grid: `{min_x, max_y, max_x, min_y}`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub min_x: f64,
    pub max_y: f64,
    pub max_x: f64,
    pub min_y: f64,
}

impl Extent {
    /// Horizontal span in map units.
    #[must_use]
    pub fn span_x(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Vertical span in map units.
    #[must_use]
    pub fn span_y(&self) -> f64 {
        self.max_y - self.min_y
    }
}

impl GridGeometry {
    /// Derive the outer extent from origin, cell size and dimensions.
    #[must_use]
    pub fn extent(&self) -> Extent {
        Extent {
            min_x: self.origin_x,
            max_y: self.origin_y,
            max_x: self.origin_x + self.pixel_size * self.width as f64,
            min_y: self.origin_y - self.pixel_size * self.height as f64,
        }
    }

    /// World coordinates of the center of cell (row, col).
    #[must_use]
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        let half = self.pixel_size / 2.0;
        (
            self.origin_x + col as f64 * self.pixel_size + half,
            self.origin_y - row as f64 * self.pixel_size - half,
        )
    }

    /// Map world coordinates to the containing cell, or `None` when outside
    /// the grid.
    #[must_use]
    pub fn world_to_cell(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let col = (x - self.origin_x) / self.pixel_size;
        let row = (self.origin_y - y) / self.pixel_size;
        if col < 0.0 || row < 0.0 {
            return None;
        }
        let (row, col) = (row as usize, col as usize);
        (row < self.height && col < self.width).then_some((row, col))
    }

    /// Nearest cell to world coordinates, clamped to the grid, or `None`
    /// when more than half a pixel outside it.
    #[must_use]
    pub fn nearest_cell(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let col = (x - self.origin_x) / self.pixel_size - 0.5;
        let row = (self.origin_y - y) / self.pixel_size - 0.5;
        if col < -0.5
            || row < -0.5
            || col > self.width as f64 - 0.5
            || row > self.height as f64 - 0.5
        {
            return None;
        }
        let col = (col.round() as isize).clamp(0, self.width as isize - 1);
        let row = (row.round() as isize).clamp(0, self.height as isize - 1);
        Some((row as usize, col as usize))
    }
}

/// Summary statistics over the valid cells of a raster.
#[derive(Debug, Clone, Copy)]
pub struct RasterStats {
    pub min: f32,
    pub max: f32,
    pub mean: f64,
    pub valid_cells: usize,
}

/// Dense single-band raster with its own geometry and CRS.
#[derive(Debug, Clone)]
pub struct Raster {
    /// Row-major pixel values; missing cells hold [`Raster::nodata`].
    pub pixels: Vec<f32>,
    pub geometry: GridGeometry,
    /// EPSG code of the coordinate reference system.
    pub epsg: u16,
    /// No-data sentinel for this raster.
    pub nodata: f32,
}

impl Raster {
    /// Create a raster filled with the no-data sentinel.
    #[must_use]
    pub fn filled_nodata(geometry: GridGeometry, epsg: u16) -> Self {
        Self {
            pixels: vec![NODATA; geometry.width * geometry.height],
            geometry,
            epsg,
            nodata: NODATA,
        }
    }

    /// Value at (row, col). Panics when out of bounds, like slice indexing.
    #[inline]
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.pixels[row * self.geometry.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.pixels[row * self.geometry.width + col] = value;
    }

    /// Whether a value counts as missing for this raster.
    ///
    /// Both the sentinel and NaN are treated as absent; neither may ever be
    /// compared or aggregated as a numeric zero.
    #[inline]
    #[must_use]
    pub fn is_nodata(&self, value: f32) -> bool {
        value.is_nan() || value == self.nodata
    }

    /// Number of cells holding a valid value.
    #[must_use]
    pub fn valid_cells(&self) -> usize {
        self.pixels.iter().filter(|&&v| !self.is_nodata(v)).count()
    }

    /// Min/max/mean over valid cells, or `None` when every cell is missing.
    #[must_use]
    pub fn stats(&self) -> Option<RasterStats> {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0.0_f64;
        let mut n = 0_usize;
        for &v in &self.pixels {
            if self.is_nodata(v) {
                continue;
            }
            min = min.min(v);
            max = max.max(v);
            sum += f64::from(v);
            n += 1;
        }
        (n > 0).then(|| RasterStats {
            min,
            max,
            mean: sum / n as f64,
            valid_cells: n,
        })
    }
}
