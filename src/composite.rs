//! C-factor compositor.
//!
//! Blends the per-band percent fractions of a land-cover dataset with the
//! seasonal coefficients of a [`CFactorTable`] into two scalar fields:
//! `cell = Σ_k fraction_k * coefficient_k`. Fractions are percent/100 and
//! are deliberately not renormalized; they need not sum to exactly 100.
//!
//! Bands stored `(longitude, latitude)` are transposed into the north-up
//! `(latitude, longitude)` output convention during accumulation, and axes
//! stored south-first or east-first are flipped to match the derived
//! geometry, which always declares a north-up west-east grid. A fill
//! value in any band makes the whole output cell no-data: a partial sum
//! over a subset of classes would understate cover, not measure it.

use tracing::debug;

use crate::error::{Error, Result};
use crate::landcover::{is_fill, BandOrder, LandCoverDataset};
use crate::lookup::CFactorTable;
use crate::raster::{Raster, NODATA};

/// Season selector for the two composited fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Season {
    Summer,
    Winter,
}

impl Season {
    /// Both seasons, in pipeline processing order.
    pub const ALL: [Season; 2] = [Season::Summer, Season::Winter];

    /// Lowercase tag used in artifact file names.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Season::Summer => "summer",
            Season::Winter => "winter",
        }
    }
}

impl std::fmt::Display for Season {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// The two composited C-factor fields for one input dataset.
#[derive(Debug, Clone)]
pub struct SeasonalFields {
    pub summer: Raster,
    pub winter: Raster,
}

impl SeasonalFields {
    #[must_use]
    pub fn get(&self, season: Season) -> &Raster {
        match season {
            Season::Summer => &self.summer,
            Season::Winter => &self.winter,
        }
    }
}

/// Composite all bands of `dataset` into summer and winter C-factor fields.
///
/// # Errors
/// `LookupMismatch` when the dataset has more bands than the table has rows;
/// `Format`/`NetCdf` for unreadable bands.
pub fn composite(dataset: &LandCoverDataset, table: &CFactorTable) -> Result<SeasonalFields> {
    let band_count = dataset.band_count();
    if band_count > table.len() {
        return Err(Error::LookupMismatch(format!(
            "dataset has {band_count} bands but the lookup table maps only {}",
            table.len()
        )));
    }

    let geometry = dataset.grid_geometry()?;
    let axes = dataset.axis_directions()?;
    let (lon_dim, lat_dim) = (dataset.lon_dim(), dataset.lat_dim());
    let cells = lon_dim * lat_dim;

    // Accumulate in f64, demote to f32 once at the end.
    let mut summer = vec![0.0_f64; cells];
    let mut winter = vec![0.0_f64; cells];
    let mut poisoned = vec![false; cells];

    for k in 0..band_count {
        let band = dataset.read_band(k)?;
        let row = table
            .get(k)
            .ok_or_else(|| Error::LookupMismatch(format!("no coefficients for band {k}")))?;

        for lat in 0..lat_dim {
            for lon in 0..lon_dim {
                let src = match band.order {
                    BandOrder::LatLon => lat * lon_dim + lon,
                    BandOrder::LonLat => lon * lat_dim + lat,
                };
                // Storage index 0 is not always the north-west corner; flip
                // so row 0 is the northernmost latitude, col 0 the western-
                // most longitude.
                let dst_row = if axes.lat_ascending { lat_dim - 1 - lat } else { lat };
                let col = if axes.lon_descending { lon_dim - 1 - lon } else { lon };
                let dst = dst_row * lon_dim + col;

                let value = band.values[src];
                if is_fill(value) {
                    poisoned[dst] = true;
                    continue;
                }
                let fraction = value / 100.0;
                summer[dst] += fraction * row.summer;
                winter[dst] += fraction * row.winter;
            }
        }
    }

    debug!(
        bands = band_count,
        cells,
        missing = poisoned.iter().filter(|&&p| p).count(),
        "composited C-factor fields"
    );

    let finalize = |acc: Vec<f64>| -> Raster {
        let pixels = acc
            .into_iter()
            .zip(&poisoned)
            .map(|(v, &bad)| if bad { NODATA } else { v as f32 })
            .collect();
        Raster {
            pixels,
            geometry,
            epsg: 4326,
            nodata: NODATA,
        }
    };

    Ok(SeasonalFields {
        summer: finalize(summer),
        winter: finalize(winter),
    })
}
