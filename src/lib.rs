#![doc = include_str!("../README.md")]
//!
//! ## Architecture
//!
//! The library is organized into one module per pipeline stage:
//!
//! - [`landcover`]: NetCDF land-cover dataset access
//! - [`lookup`]: Seasonal C-factor coefficient table (CSV)
//! - [`composite`]: Band compositing into seasonal fields
//! - [`reproject`]: CRS transforms and nearest-neighbor reprojection
//! - [`points`]: Raster-to-point sampling
//! - [`interpolate`]: Inverse-distance-weighted gridding via [`IdwInterpolator`]
//! - [`clip`]: Polygon boundary masking and bbox cropping
//! - [`geotiff`]: GeoTIFF reading and writing ([`GeoTiffWriter`] builder)
//! - [`raster`]: In-memory raster and grid geometry types
//! - [`pipeline`]: Batch orchestration ([`Pipeline`])

// ============================================================================
// Public modules
// ============================================================================

pub mod clip;
pub mod composite;
pub mod config;
pub mod error;
pub mod geotiff;
pub mod interpolate;
pub mod landcover;
pub mod lookup;
pub mod pipeline;
pub mod points;
pub mod raster;
pub mod reproject;

// ============================================================================
// Core Types
// ============================================================================

pub use error::{Error, Result};
pub use raster::{Extent, GridGeometry, Raster, RasterStats, NODATA};

// ============================================================================
// Pipeline
// ============================================================================
// Primary API: Pipeline::new(config)?.run()

pub use config::{InterpolationParams, PipelineConfig};
pub use pipeline::{JobFailure, Pipeline, RunSummary};

// ============================================================================
// Stages
// ============================================================================

pub use composite::{composite, Season, SeasonalFields};
pub use interpolate::IdwInterpolator;
pub use landcover::LandCoverDataset;
pub use lookup::CFactorTable;
pub use points::{raster_to_points, write_xyz_csv, SamplePoint};
pub use reproject::{reproject, Transformer};

// ============================================================================
// Clipping
// ============================================================================

pub use clip::{clip, Boundary};

// ============================================================================
// GeoTIFF I/O
// ============================================================================

pub use geotiff::{read_geotiff, GeoTiffCompression, GeoTiffWriter, SnapGrid};
