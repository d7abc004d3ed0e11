//! Raster reprojection between EPSG coordinate reference systems.
//!
//! Pure Rust via proj4rs with PROJ strings from the crs-definitions
//! database. The output transform and dimensions are computed from the
//! source extent under the new projection, never hardcoded, and every
//! target cell is filled by nearest-neighbor assignment from the source.
//! Nearest-neighbor is a deterministic policy choice kept for
//! reproducibility; bilinear would prioritize continuity instead.

use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use rayon::prelude::*;
use tracing::debug;

use crate::error::{Error, Result};
use crate::raster::{GridGeometry, Raster, NODATA};

/// PROJ4 string for an EPSG code from the crs-definitions database.
#[inline]
#[must_use]
pub fn proj_string(epsg: u16) -> Option<&'static str> {
    crs_definitions::from_code(epsg).map(|def| def.proj4)
}

/// Whether an EPSG code is a geographic (lon/lat) CRS.
#[must_use]
pub fn is_geographic_crs(epsg: u16) -> bool {
    if let Some(proj_str) = proj_string(epsg) {
        proj_str.contains("+proj=longlat")
    } else {
        epsg == 4326 || (4000..5000).contains(&epsg)
    }
}

/// Coordinate transformer between two EPSG codes.
///
/// proj4rs works in radians for geographic CRS; the transformer owns the
/// degree/radian conversions on both sides.
pub struct Transformer {
    source: Proj,
    target: Proj,
    source_is_geographic: bool,
    target_is_geographic: bool,
}

impl Transformer {
    /// Build a transformer from `source_epsg` to `target_epsg`.
    ///
    /// # Errors
    /// `Reprojection` when either code is not in the database or its PROJ
    /// string does not parse.
    pub fn new(source_epsg: u16, target_epsg: u16) -> Result<Self> {
        let source_str = proj_string(source_epsg).ok_or_else(|| {
            Error::Reprojection(format!("EPSG:{source_epsg} is not a recognized CRS"))
        })?;
        let target_str = proj_string(target_epsg).ok_or_else(|| {
            Error::Reprojection(format!("EPSG:{target_epsg} is not a recognized CRS"))
        })?;

        let source = Proj::from_proj_string(source_str)
            .map_err(|e| Error::Reprojection(format!("invalid source EPSG:{source_epsg}: {e:?}")))?;
        let target = Proj::from_proj_string(target_str)
            .map_err(|e| Error::Reprojection(format!("invalid target EPSG:{target_epsg}: {e:?}")))?;

        Ok(Self {
            source,
            target,
            source_is_geographic: is_geographic_crs(source_epsg),
            target_is_geographic: is_geographic_crs(target_epsg),
        })
    }

    /// Transform a single (x, y) from source to target CRS.
    ///
    /// # Errors
    /// `Reprojection` when the transform computation fails for this point.
    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let (x_in, y_in) = if self.source_is_geographic {
            (x.to_radians(), y.to_radians())
        } else {
            (x, y)
        };

        let mut point = (x_in, y_in, 0.0);
        transform(&self.source, &self.target, &mut point)
            .map_err(|e| Error::Reprojection(format!("transform failed at ({x}, {y}): {e:?}")))?;

        if self.target_is_geographic {
            Ok((point.0.to_degrees(), point.1.to_degrees()))
        } else {
            Ok((point.0, point.1))
        }
    }
}

/// Samples per raster edge when tracing the source extent into the target
/// CRS. Edges curve under reprojection, so corners alone under-cover.
const EDGE_SAMPLES: usize = 32;

/// Reproject a raster to `target_epsg` with nearest-neighbor resampling.
///
/// The target extent is the bounding box of the source boundary under the
/// new projection; the target pixel size approximately preserves the source
/// pixel count. Cells mapping outside the source, or onto missing data,
/// receive the no-data sentinel.
///
/// # Errors
/// `Reprojection` for unrecognized CRS codes or failed transform
/// computation over the whole extent.
pub fn reproject(raster: &Raster, target_epsg: u16) -> Result<Raster> {
    if raster.epsg == target_epsg {
        return Ok(raster.clone());
    }

    let forward = Transformer::new(raster.epsg, target_epsg)?;
    let inverse = Transformer::new(target_epsg, raster.epsg)?;

    let src = &raster.geometry;
    let extent = src.extent();

    // Trace the source boundary through the forward transform; the target
    // bbox must cover every edge point, not just the corners.
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    let mut mapped = 0_usize;
    for i in 0..=EDGE_SAMPLES {
        let t = i as f64 / EDGE_SAMPLES as f64;
        let x = extent.min_x + t * extent.span_x();
        let y = extent.min_y + t * extent.span_y();
        let edge_points = [
            (x, extent.min_y),
            (x, extent.max_y),
            (extent.min_x, y),
            (extent.max_x, y),
        ];
        for (px, py) in edge_points {
            // Individual edge points may fall outside the target
            // projection's domain; the bbox covers the rest.
            if let Ok((tx, ty)) = forward.transform(px, py) {
                min_x = min_x.min(tx);
                min_y = min_y.min(ty);
                max_x = max_x.max(tx);
                max_y = max_y.max(ty);
                mapped += 1;
            }
        }
    }
    if mapped == 0 || !(min_x < max_x && min_y < max_y) {
        return Err(Error::Reprojection(format!(
            "source extent does not map into EPSG:{target_epsg}"
        )));
    }

    // Pixel size preserving approximate source pixel count; dimensions are
    // derived from the transform.
    let pixel_size = ((max_x - min_x) / src.width as f64)
        .max((max_y - min_y) / src.height as f64);
    let width = ((max_x - min_x) / pixel_size).ceil().max(1.0) as usize;
    let height = ((max_y - min_y) / pixel_size).ceil().max(1.0) as usize;

    let geometry = GridGeometry {
        origin_x: min_x,
        origin_y: max_y,
        pixel_size,
        width,
        height,
    };

    debug!(
        source_epsg = raster.epsg,
        target_epsg,
        width,
        height,
        pixel_size,
        "computed reprojection target grid"
    );

    let pixels: Vec<f32> = (0..height)
        .into_par_iter()
        .flat_map_iter(|row| {
            let raster = &raster;
            let inverse = &inverse;
            (0..width).map(move |col| {
                let (x, y) = geometry.cell_center(row, col);
                let Ok((sx, sy)) = inverse.transform(x, y) else {
                    return NODATA;
                };
                match raster.geometry.nearest_cell(sx, sy) {
                    Some((r, c)) => {
                        let v = raster.get(r, c);
                        if raster.is_nodata(v) {
                            NODATA
                        } else {
                            v
                        }
                    }
                    None => NODATA,
                }
            })
        })
        .collect();

    Ok(Raster {
        pixels,
        geometry,
        epsg: target_epsg,
        nodata: NODATA,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn proj_strings_for_common_codes() {
        assert!(proj_string(4326).is_some());
        assert!(proj_string(3857).is_some());
        assert!(proj_string(32634).is_some());
        assert!(proj_string(65535).is_none());
    }

    #[test]
    fn geographic_detection() {
        assert!(is_geographic_crs(4326));
        assert!(!is_geographic_crs(3857));
        assert!(!is_geographic_crs(32634));
    }

    #[test]
    fn transformer_roundtrip_utm34() {
        let to_utm = Transformer::new(4326, 32634).unwrap();
        let back = Transformer::new(32634, 4326).unwrap();

        let (x, y) = to_utm.transform(21.0, 52.0).unwrap();
        // Zone 34 central meridian is 21E, so easting is near 500 km.
        assert!((x - 500_000.0).abs() < 1_000.0, "easting {x}");
        assert!(y > 5_000_000.0 && y < 6_500_000.0, "northing {y}");

        let (lon, lat) = back.transform(x, y).unwrap();
        assert_relative_eq!(lon, 21.0, epsilon = 1e-6);
        assert_relative_eq!(lat, 52.0, epsilon = 1e-6);
    }

    #[test]
    fn unknown_crs_is_reprojection_error() {
        assert!(matches!(
            Transformer::new(4326, 65534),
            Err(Error::Reprojection(_))
        ));
    }

    fn lonlat_raster() -> Raster {
        // 10x10 grid of 0.05-degree cells inside UTM zone 34 (18E..24E).
        let geometry = GridGeometry {
            origin_x: 20.0,
            origin_y: 50.0,
            pixel_size: 0.05,
            width: 10,
            height: 10,
        };
        let mut raster = Raster::filled_nodata(geometry, 4326);
        for row in 0..10 {
            for col in 0..10 {
                raster.set(row, col, (row * 10 + col) as f32);
            }
        }
        raster
    }

    #[test]
    fn same_crs_is_identity() {
        let raster = lonlat_raster();
        let out = reproject(&raster, 4326).unwrap();
        assert_eq!(out.pixels, raster.pixels);
        assert_eq!(out.geometry, raster.geometry);
    }

    #[test]
    fn output_grid_is_derived_not_hardcoded() {
        let raster = lonlat_raster();
        let out = reproject(&raster, 32634).unwrap();
        assert_eq!(out.epsg, 32634);
        // 0.05 deg is roughly 3.4-5.6 km here; the derived cell size must
        // land in that range, and the grid must cover the source extent.
        assert!(out.geometry.pixel_size > 2_000.0 && out.geometry.pixel_size < 7_000.0);
        assert!(out.geometry.width >= raster.geometry.width);
        assert!(out.geometry.height >= 1);
    }

    #[test]
    fn roundtrip_preserves_interior_values() {
        let raster = lonlat_raster();
        let utm = reproject(&raster, 32634).unwrap();
        let back = reproject(&utm, 4326).unwrap();

        // Nearest-neighbor copies values unchanged, so interior cell
        // centers must sample to exactly the original value.
        for row in 2..8 {
            for col in 2..8 {
                let (x, y) = raster.geometry.cell_center(row, col);
                let (r, c) = back.geometry.nearest_cell(x, y).unwrap();
                assert_eq!(back.get(r, c), raster.get(row, col), "cell ({row}, {col})");
            }
        }
    }

    #[test]
    fn nodata_propagates_as_sentinel() {
        let mut raster = lonlat_raster();
        for col in 0..10 {
            raster.set(4, col, NODATA);
        }
        let out = reproject(&raster, 32634).unwrap();
        // Some target cells must land on the masked stripe and stay missing.
        assert!(out.pixels.iter().any(|&v| v == NODATA));
        // And none may have invented data outside the value range.
        for &v in &out.pixels {
            assert!(v == NODATA || (0.0..100.0).contains(&v));
        }
    }
}
