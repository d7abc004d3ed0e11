//! Scattered-point interpolation engine.
//!
//! Rebuilds a dense raster on an arbitrary target grid from a point cloud
//! using inverse-distance weighting over the nearest up to `max_neighbors`
//! points within `search_radius`:
//! `w_i = 1 / (d_i^power + smoothing)`, `value = Σ w_i z_i / Σ w_i`.
//! This reproduces `gdal_grid -a invdistnn`.
//!
//! Neighbor search goes through an R-tree, so cost is bounded by the search
//! radius instead of scanning the whole cloud per cell; rows are filled in
//! parallel.

use rayon::prelude::*;
use rstar::primitives::GeomWithData;
use rstar::RTree;
use tracing::debug;

use crate::config::InterpolationParams;
use crate::error::{Error, Result};
use crate::points::SamplePoint;
use crate::raster::{Extent, GridGeometry, Raster, NODATA};

type TreePoint = GeomWithData<[f64; 2], f32>;

/// IDW interpolator over a fixed point cloud.
///
/// Building the R-tree is the expensive part; one interpolator can fill any
/// number of target grids.
pub struct IdwInterpolator {
    tree: RTree<TreePoint>,
    params: InterpolationParams,
}

impl IdwInterpolator {
    /// Index a point cloud for interpolation.
    ///
    /// # Errors
    /// `Interpolation` when the cloud is empty or the parameters are
    /// degenerate (non-positive radius, zero neighbors).
    pub fn new(points: &[SamplePoint], params: InterpolationParams) -> Result<Self> {
        if points.is_empty() {
            return Err(Error::Interpolation("empty point cloud".into()));
        }
        if params.max_neighbors == 0 {
            return Err(Error::Interpolation("max_neighbors must be at least 1".into()));
        }
        if !(params.search_radius > 0.0) {
            return Err(Error::Interpolation(format!(
                "search radius {} is not positive",
                params.search_radius
            )));
        }

        let tree = RTree::bulk_load(
            points
                .iter()
                .map(|p| TreePoint::new([p.x, p.y], p.value))
                .collect(),
        );
        debug!(points = points.len(), "indexed point cloud");
        Ok(Self { tree, params })
    }

    /// Interpolate onto the grid defined by `extent` and `cell_size`.
    ///
    /// Output shape is `round(span / cell_size)` in each axis; this rounding
    /// policy is fixed because it determines the raster shape exactly.
    /// Cells with no point inside the search radius get the sentinel.
    ///
    /// # Errors
    /// `Interpolation` when the target grid has non-positive cell size or a
    /// degenerate extent.
    pub fn interpolate(&self, extent: Extent, cell_size: f64, epsg: u16) -> Result<Raster> {
        if !(cell_size > 0.0) {
            return Err(Error::Interpolation(format!(
                "cell size {cell_size} is not positive"
            )));
        }
        let width = (extent.span_x() / cell_size).round() as isize;
        let height = (extent.span_y() / cell_size).round() as isize;
        if width <= 0 || height <= 0 {
            return Err(Error::Interpolation(format!(
                "target grid {width}x{height} is degenerate"
            )));
        }
        let (width, height) = (width as usize, height as usize);

        let geometry = GridGeometry {
            origin_x: extent.min_x,
            origin_y: extent.max_y,
            pixel_size: cell_size,
            width,
            height,
        };

        let pixels: Vec<f32> = (0..height)
            .into_par_iter()
            .flat_map_iter(|row| {
                (0..width).map(move |col| {
                    let (x, y) = geometry.cell_center(row, col);
                    self.cell_value(x, y)
                })
            })
            .collect();

        Ok(Raster {
            pixels,
            geometry,
            epsg,
            nodata: NODATA,
        })
    }

    /// IDW value at one query location, or the sentinel when no point lies
    /// within the search radius.
    #[must_use]
    pub fn cell_value(&self, x: f64, y: f64) -> f32 {
        let p = &self.params;
        let radius_2 = p.search_radius * p.search_radius;

        let mut weight_sum = 0.0_f64;
        let mut value_sum = 0.0_f64;
        let mut found = 0_usize;

        for (point, d2) in self
            .tree
            .nearest_neighbor_iter_with_distance_2(&[x, y])
            .take(p.max_neighbors)
        {
            if d2 > radius_2 {
                break;
            }
            // A coincident point is a direct match, not a divide-by-zero.
            if d2 == 0.0 && p.smoothing == 0.0 {
                return point.data;
            }
            let weight = 1.0 / (d2.powf(p.power / 2.0) + p.smoothing);
            weight_sum += weight;
            value_sum += weight * f64::from(point.data);
            found += 1;
        }

        if found == 0 || weight_sum == 0.0 {
            NODATA
        } else {
            (value_sum / weight_sum) as f32
        }
    }
}
