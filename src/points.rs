//! Raster-to-point sampler.
//!
//! Turns the valid cells of a raster into a point cloud of cell-center
//! coordinates with values, consumed directly by the interpolation engine.
//! Scan order is row-major; downstream code must not attach meaning to it.

use std::path::Path;

use crate::error::{Error, Result};
use crate::raster::Raster;

/// One sampled cell center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePoint {
    pub x: f64,
    pub y: f64,
    pub value: f32,
}

/// Extract every valid cell of `raster` as a cell-center point.
///
/// All valid cells are emitted; zero or one valid cells simply yield a short
/// (possibly empty) cloud. Iterating one short of the count would silently
/// drop the last valid cell, so the `emits_every_valid_cell` test pins the
/// full count.
#[must_use]
pub fn raster_to_points(raster: &Raster) -> Vec<SamplePoint> {
    let geom = &raster.geometry;
    let mut points = Vec::with_capacity(raster.valid_cells());

    for row in 0..geom.height {
        for col in 0..geom.width {
            let value = raster.get(row, col);
            if raster.is_nodata(value) {
                continue;
            }
            let (x, y) = geom.cell_center(row, col);
            points.push(SamplePoint { x, y, value });
        }
    }
    points
}

/// Write a point cloud as `x,y,z` CSV rows, for diagnostics only.
///
/// # Errors
/// Returns an error when the file cannot be written.
pub fn write_xyz_csv<P: AsRef<Path>>(points: &[SamplePoint], path: P) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref()).map_err(csv_io)?;
    writer.write_record(["x", "y", "z"]).map_err(csv_io)?;
    for p in points {
        writer
            .write_record([p.x.to_string(), p.y.to_string(), p.value.to_string()])
            .map_err(csv_io)?;
    }
    writer.flush()?;
    Ok(())
}

fn csv_io(e: csv::Error) -> Error {
    Error::Io(std::io::Error::other(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{GridGeometry, Raster, NODATA};
    use approx::assert_relative_eq;

    fn raster_with(values: &[(usize, usize, f32)]) -> Raster {
        let geometry = GridGeometry {
            origin_x: 1000.0,
            origin_y: 2000.0,
            pixel_size: 10.0,
            width: 5,
            height: 4,
        };
        let mut raster = Raster::filled_nodata(geometry, 32634);
        for &(row, col, v) in values {
            raster.set(row, col, v);
        }
        raster
    }

    #[test]
    fn emits_every_valid_cell() {
        // Regression: the point count must equal the number of valid cells,
        // including the last one in scan order.
        let raster = raster_with(&[(0, 0, 1.0), (1, 3, 2.0), (3, 4, 3.0)]);
        let points = raster_to_points(&raster);
        assert_eq!(points.len(), raster.valid_cells());
        assert_eq!(points.len(), 3);
        assert_eq!(points.last().unwrap().value, 3.0);
    }

    #[test]
    fn coordinates_are_cell_centers() {
        let raster = raster_with(&[(1, 2, 7.5)]);
        let points = raster_to_points(&raster);
        assert_eq!(points.len(), 1);
        assert_relative_eq!(points[0].x, 1025.0);
        assert_relative_eq!(points[0].y, 1985.0);
        assert_eq!(points[0].value, 7.5);
    }

    #[test]
    fn empty_and_single_cell_clouds() {
        let empty = raster_with(&[]);
        assert!(raster_to_points(&empty).is_empty());

        let single = raster_with(&[(2, 2, 42.0)]);
        assert_eq!(raster_to_points(&single).len(), 1);
    }

    #[test]
    fn nan_counts_as_missing() {
        let mut raster = raster_with(&[(0, 0, 1.0)]);
        raster.set(0, 1, f32::NAN);
        assert_eq!(raster_to_points(&raster).len(), 1);
    }

    #[test]
    fn csv_dump_has_header_and_rows() {
        let raster = raster_with(&[(0, 0, 1.0), (1, 1, 2.0)]);
        let points = raster_to_points(&raster);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.csv");
        write_xyz_csv(&points, &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "x,y,z");
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("1005,1995,"));
    }

    #[test]
    fn sentinel_never_sampled() {
        let mut raster = raster_with(&[(0, 0, 1.0)]);
        raster.set(3, 4, NODATA);
        let points = raster_to_points(&raster);
        assert!(points.iter().all(|p| p.value != NODATA));
    }
}
