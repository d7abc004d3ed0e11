//! Pipeline configuration.
//!
//! One immutable [`PipelineConfig`] is built up front (by the CLI or by a
//! caller embedding the library) and shared by reference across all workers.
//! There is no ambient global state.

use std::path::PathBuf;

/// Inverse-distance-weighting parameters for the interpolation engine.
///
/// The defaults reproduce `gdal_grid -a invdistnn:power=2.0:smoothing=0:
/// max_points=12:radius=5000`.
#[derive(Debug, Clone, Copy)]
pub struct InterpolationParams {
    /// Exponent applied to point distance when weighting.
    pub power: f64,
    /// Additive smoothing term in the weight denominator.
    pub smoothing: f64,
    /// Maximum number of neighbors contributing to one output cell.
    pub max_neighbors: usize,
    /// Search radius in map units around each output cell center.
    pub search_radius: f64,
}

impl Default for InterpolationParams {
    fn default() -> Self {
        Self {
            power: 2.0,
            smoothing: 0.0,
            max_neighbors: 12,
            search_radius: 5000.0,
        }
    }
}

/// Immutable configuration for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory scanned for `*.nc` land-cover datasets.
    pub landcover_dir: PathBuf,
    /// CSV lookup table mapping band index to seasonal C-factor coefficients.
    pub lookup_table: PathBuf,
    /// GeoJSON polygon boundary used by the clipper.
    pub boundary: PathBuf,
    /// Reference raster fixing the output grid template.
    pub snap_raster: PathBuf,
    /// Directory receiving final `{alias}_{season}_clip.tif` artifacts.
    pub output_dir: PathBuf,
    /// Directory for intermediate artifacts.
    pub work_dir: PathBuf,
    /// EPSG code of the target CRS for reprojection and final output.
    pub target_epsg: u16,
    /// Keep per-stage intermediate files instead of erasing them.
    pub keep_intermediates: bool,
    /// IDW parameters for the interpolation engine.
    pub interpolation: InterpolationParams,
}

impl PipelineConfig {
    /// Set the IDW parameters.
    #[must_use]
    pub fn with_interpolation(mut self, params: InterpolationParams) -> Self {
        self.interpolation = params;
        self
    }

    /// Retain intermediate artifacts for diagnostics.
    #[must_use]
    pub fn with_keep_intermediates(mut self, keep: bool) -> Self {
        self.keep_intermediates = keep;
        self
    }
}
