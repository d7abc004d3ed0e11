//! CLI entry point for the C-factor pipeline.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cfactor::{InterpolationParams, Pipeline, PipelineConfig};

/// Convert land-cover fraction grids into clipped C-factor rasters.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Directory containing the NetCDF land-cover inputs (*.nc)
    #[arg(long)]
    landcover_dir: PathBuf,

    /// CSV table of per-class seasonal C-factor coefficients
    #[arg(long)]
    lookup: PathBuf,

    /// GeoJSON boundary polygon(s) in the target CRS
    #[arg(long)]
    boundary: PathBuf,

    /// GeoTIFF whose grid the interpolated output snaps to
    #[arg(long)]
    snap_raster: PathBuf,

    /// Directory for the final clipped rasters
    #[arg(long)]
    output_dir: PathBuf,

    /// Directory for intermediate artifacts (defaults to <output-dir>/work)
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Target projected CRS as an EPSG code
    #[arg(long, default_value_t = 32634)]
    target_epsg: u16,

    /// Retain per-stage intermediate rasters and point dumps
    #[arg(long)]
    keep_intermediates: bool,

    /// Inverse-distance weighting power
    #[arg(long, default_value_t = 2.0)]
    power: f64,

    /// Additive smoothing term in the IDW weight denominator
    #[arg(long, default_value_t = 0.0)]
    smoothing: f64,

    /// Maximum neighbors contributing to one interpolated cell
    #[arg(long, default_value_t = 12)]
    max_neighbors: usize,

    /// Neighbor search radius in target CRS units
    #[arg(long, default_value_t = 5000.0)]
    search_radius: f64,
}

impl Cli {
    fn into_config(self) -> PipelineConfig {
        let work_dir = self
            .work_dir
            .unwrap_or_else(|| self.output_dir.join("work"));
        PipelineConfig {
            landcover_dir: self.landcover_dir,
            lookup_table: self.lookup,
            boundary: self.boundary,
            snap_raster: self.snap_raster,
            output_dir: self.output_dir,
            work_dir,
            target_epsg: self.target_epsg,
            keep_intermediates: self.keep_intermediates,
            interpolation: InterpolationParams {
                power: self.power,
                smoothing: self.smoothing,
                max_neighbors: self.max_neighbors,
                search_radius: self.search_radius,
            },
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let pipeline = Pipeline::new(cli.into_config()).context("pipeline setup failed")?;
    let summary = pipeline.run();

    if summary.failures.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        for failure in &summary.failures {
            eprintln!("{failure}");
        }
        Ok(ExitCode::FAILURE)
    }
}
