//! Error taxonomy for the C-factor pipeline.
//!
//! Stage errors are isolated per (file, season) job by the pipeline; only
//! configuration-level errors (missing directories, unreadable lookup table)
//! abort a whole run.

use std::path::PathBuf;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All failure modes of the transform chain.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An input dataset is missing expected dimensions or bands.
    #[error("format error in {path}: {reason}")]
    Format { path: PathBuf, reason: String },

    /// The land-cover band count exceeds the lookup table, or the table is malformed.
    #[error("lookup table mismatch: {0}")]
    LookupMismatch(String),

    /// Unrecognized CRS or failed transform computation.
    #[error("reprojection failed: {0}")]
    Reprojection(String),

    /// Degenerate point cloud or invalid target grid.
    #[error("interpolation failed: {0}")]
    Interpolation(String),

    /// Unreadable or empty boundary geometry.
    #[error("clip failed: {0}")]
    Clip(String),

    /// GeoTIFF encoding or decoding failure.
    #[error("GeoTIFF error: {0}")]
    GeoTiff(#[from] tiff::TiffError),

    /// NetCDF access failure.
    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
