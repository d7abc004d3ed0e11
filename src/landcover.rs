//! Land-cover band reader for NetCDF datasets.
//!
//! Input files carry dimensions named `longitude` and `latitude` and one
//! float variable per plant-functional-type class, named `PFT0..PFT{N-1}`,
//! holding percent coverage in `[0, 100]`. The handle is released when the
//! [`LandCoverDataset`] drops, so callers get deterministic cleanup by
//! scoping the value.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::raster::GridGeometry;

/// Values at or above this are NetCDF fill (default double fill is
/// ~9.9692e36) and count as missing.
pub const FILL_THRESHOLD: f64 = 9.0e36;

/// Whether a raw band value is the fill sentinel rather than a measurement.
#[inline]
#[must_use]
pub fn is_fill(value: f64) -> bool {
    !value.is_finite() || value >= FILL_THRESHOLD
}

/// Storage order of a band's two spatial dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandOrder {
    /// `(latitude, longitude)`, matching the north-up output convention.
    LatLon,
    /// `(longitude, latitude)`, transposed relative to the output and
    /// corrected during compositing.
    LonLat,
}

/// Storage direction of the coordinate axes.
///
/// Index 0 of a dimension is wherever the file starts, not necessarily the
/// north-west corner; the compositor flips indices so the output is always
/// north-up west-east regardless of storage direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisDirections {
    /// Latitude coordinates ascend with their index (south stored first).
    pub lat_ascending: bool,
    /// Longitude coordinates descend with their index (east stored first).
    pub lon_descending: bool,
}

/// One band read out of the dataset, with its detected storage order.
#[derive(Debug)]
pub struct Band {
    /// Raw percent values in the variable's own dimension order.
    pub values: Vec<f64>,
    pub order: BandOrder,
}

/// An opened multi-band land-cover dataset.
pub struct LandCoverDataset {
    file: netcdf::File,
    path: PathBuf,
    lon_dim: usize,
    lat_dim: usize,
    band_count: usize,
}

impl LandCoverDataset {
    /// Open a dataset and census its dimensions and bands.
    ///
    /// # Errors
    /// `Format` when the `longitude`/`latitude` dimensions are absent or no
    /// `PFT0` band exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = netcdf::open(&path)?;

        let lon_dim = file
            .dimension("longitude")
            .ok_or_else(|| Error::format(&path, "missing `longitude` dimension"))?
            .len();
        let lat_dim = file
            .dimension("latitude")
            .ok_or_else(|| Error::format(&path, "missing `latitude` dimension"))?
            .len();

        // Bands are PFT0..PFT{N-1}, contiguous from zero.
        let mut band_count = 0;
        while file.variable(&format!("PFT{band_count}")).is_some() {
            band_count += 1;
        }
        if band_count == 0 {
            return Err(Error::format(&path, "no PFT bands found"));
        }

        debug!(
            path = %path.display(),
            bands = band_count,
            lon = lon_dim,
            lat = lat_dim,
            "opened land-cover dataset"
        );

        Ok(Self {
            file,
            path,
            lon_dim,
            lat_dim,
            band_count,
        })
    }

    /// Number of `PFT` bands.
    #[must_use]
    pub fn band_count(&self) -> usize {
        self.band_count
    }

    /// Longitude dimension length (grid width).
    #[must_use]
    pub fn lon_dim(&self) -> usize {
        self.lon_dim
    }

    /// Latitude dimension length (grid height).
    #[must_use]
    pub fn lat_dim(&self) -> usize {
        self.lat_dim
    }

    /// Path the dataset was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read band `k` in its native storage order.
    ///
    /// The order is detected from the variable's own dimension names rather
    /// than assumed, so datasets written either way composite correctly.
    ///
    /// # Errors
    /// `Format` when the band is absent, has unexpected dimensions, or its
    /// shape disagrees with the dataset dimensions.
    pub fn read_band(&self, k: usize) -> Result<Band> {
        let name = format!("PFT{k}");
        let var = self
            .file
            .variable(&name)
            .ok_or_else(|| Error::format(&self.path, format!("missing band `{name}`")))?;

        let dims = var.dimensions();
        let dim_names: Vec<String> = dims.iter().map(|d| d.name()).collect();
        let order = match dim_names
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .as_slice()
        {
            ["latitude", "longitude"] => BandOrder::LatLon,
            ["longitude", "latitude"] => BandOrder::LonLat,
            other => {
                return Err(Error::format(
                    &self.path,
                    format!("band `{name}` has unexpected dimensions {other:?}"),
                ));
            }
        };

        let values = var.get_values::<f64, _>(..)?;
        if values.len() != self.lon_dim * self.lat_dim {
            return Err(Error::format(
                &self.path,
                format!(
                    "band `{name}` has {} values, expected {}",
                    values.len(),
                    self.lon_dim * self.lat_dim
                ),
            ));
        }

        Ok(Band { values, order })
    }

    /// Geographic grid geometry derived from the coordinate variables.
    ///
    /// Coordinates are cell centers; the origin is pushed out by half a cell
    /// to the upper-left corner. Non-uniform spacing is rejected.
    ///
    /// # Errors
    /// `Format` when coordinate variables are missing, too short, or not
    /// uniformly spaced.
    pub fn grid_geometry(&self) -> Result<GridGeometry> {
        let lon = self.coordinate_values("longitude")?;
        let lat = self.coordinate_values("latitude")?;

        let cell = uniform_spacing(&lon)
            .ok_or_else(|| Error::format(&self.path, "non-uniform `longitude` spacing"))?;
        let lat_cell = uniform_spacing(&lat)
            .ok_or_else(|| Error::format(&self.path, "non-uniform `latitude` spacing"))?;
        if (cell - lat_cell).abs() > 1e-6 * cell {
            return Err(Error::format(
                &self.path,
                format!("anisotropic cells ({cell} x {lat_cell}) are not supported"),
            ));
        }

        let min_lon = lon.iter().copied().fold(f64::INFINITY, f64::min);
        let max_lat = lat.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Ok(GridGeometry {
            origin_x: min_lon - cell / 2.0,
            origin_y: max_lat + cell / 2.0,
            pixel_size: cell,
            width: self.lon_dim,
            height: self.lat_dim,
        })
    }

    /// Detect which way the coordinate axes run in storage.
    ///
    /// # Errors
    /// `Format` when a coordinate variable is missing or too short.
    pub fn axis_directions(&self) -> Result<AxisDirections> {
        let lon = self.coordinate_values("longitude")?;
        let lat = self.coordinate_values("latitude")?;
        Ok(AxisDirections {
            lat_ascending: lat[1] > lat[0],
            lon_descending: lon[1] < lon[0],
        })
    }

    fn coordinate_values(&self, name: &str) -> Result<Vec<f64>> {
        let var = self
            .file
            .variable(name)
            .ok_or_else(|| Error::format(&self.path, format!("missing `{name}` coordinate variable")))?;
        let values = var.get_values::<f64, _>(..)?;
        if values.len() < 2 {
            return Err(Error::format(
                &self.path,
                format!("`{name}` has fewer than two coordinates"),
            ));
        }
        Ok(values)
    }
}

/// Absolute spacing when consecutive values are uniformly spaced, else `None`.
fn uniform_spacing(coords: &[f64]) -> Option<f64> {
    let step = coords[1] - coords[0];
    if step == 0.0 {
        return None;
    }
    let tolerance = step.abs() * 1e-3;
    for pair in coords.windows(2) {
        if ((pair[1] - pair[0]) - step).abs() > tolerance {
            return None;
        }
    }
    Some(step.abs())
}
