//! Boundary clipper.
//!
//! Restricts a finished raster to a polygon boundary: the output grid is
//! cropped to the boundary's bounding box (snapped to the source grid so
//! cells stay aligned) and every cell whose center falls outside the
//! polygon is set to the no-data sentinel.
//!
//! Containment uses even-odd ray casting, which classifies
//! self-intersecting or otherwise malformed rings without failing; bad
//! geometry degrades the clip, it never aborts it.

use std::path::Path;

use geojson::{GeoJson, Geometry, Value};
use tracing::warn;

use crate::error::{Error, Result};
use crate::raster::{Extent, GridGeometry, Raster};

/// One polygon: an exterior ring plus optional interior (hole) rings, each
/// a closed sequence of (x, y) vertices.
#[derive(Debug, Clone)]
pub struct Polygon {
    pub rings: Vec<Vec<(f64, f64)>>,
}

/// Clip region loaded from a vector boundary file.
///
/// Coordinates are interpreted in the CRS of the raster being clipped; the
/// pipeline reprojects before clipping, so both sides are in the target CRS.
#[derive(Debug, Clone)]
pub struct Boundary {
    polygons: Vec<Polygon>,
}

impl Boundary {
    /// Build a boundary directly from polygons.
    ///
    /// # Errors
    /// `Clip` when no polygon has at least three vertices.
    pub fn from_polygons(polygons: Vec<Polygon>) -> Result<Self> {
        let polygons: Vec<Polygon> = polygons
            .into_iter()
            .filter(|p| p.rings.iter().any(|r| r.len() >= 3))
            .collect();
        if polygons.is_empty() {
            return Err(Error::Clip("boundary contains no polygon geometry".into()));
        }
        Ok(Self { polygons })
    }

    /// Load polygons from a GeoJSON file (FeatureCollection, Feature or bare
    /// geometry; Polygon and MultiPolygon members are used, the rest is
    /// ignored with a warning).
    ///
    /// # Errors
    /// `Clip` when the file is unreadable, not GeoJSON, or holds no
    /// polygonal geometry.
    pub fn from_geojson<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Clip(format!("cannot read {}: {e}", path.display())))?;
        let geojson: GeoJson = text
            .parse()
            .map_err(|e| Error::Clip(format!("{} is not valid GeoJSON: {e}", path.display())))?;

        let mut polygons = Vec::new();
        match geojson {
            GeoJson::FeatureCollection(fc) => {
                for feature in fc.features {
                    if let Some(geometry) = feature.geometry {
                        collect_polygons(&geometry, &mut polygons);
                    }
                }
            }
            GeoJson::Feature(feature) => {
                if let Some(geometry) = feature.geometry {
                    collect_polygons(&geometry, &mut polygons);
                }
            }
            GeoJson::Geometry(geometry) => collect_polygons(&geometry, &mut polygons),
        }

        if polygons.is_empty() {
            return Err(Error::Clip(format!(
                "{} holds no polygonal geometry",
                path.display()
            )));
        }
        Self::from_polygons(polygons)
    }

    /// Bounding box over all rings.
    #[must_use]
    pub fn bbox(&self) -> Extent {
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for polygon in &self.polygons {
            for ring in &polygon.rings {
                for &(x, y) in ring {
                    min_x = min_x.min(x);
                    min_y = min_y.min(y);
                    max_x = max_x.max(x);
                    max_y = max_y.max(y);
                }
            }
        }
        Extent {
            min_x,
            max_y,
            max_x,
            min_y,
        }
    }

    /// Even-odd containment test; holes exclude, self-intersections resolve
    /// by parity.
    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.polygons.iter().any(|polygon| {
            let mut crossings = 0_usize;
            for ring in &polygon.rings {
                if ring.len() < 3 {
                    continue;
                }
                let mut prev = ring[ring.len() - 1];
                for &vertex in ring {
                    let (x1, y1) = prev;
                    let (x2, y2) = vertex;
                    // Horizontal ray toward +x.
                    if (y1 > y) != (y2 > y) {
                        let x_cross = x1 + (y - y1) / (y2 - y1) * (x2 - x1);
                        if x_cross > x {
                            crossings += 1;
                        }
                    }
                    prev = vertex;
                }
            }
            crossings % 2 == 1
        })
    }
}

fn collect_polygons(geometry: &Geometry, out: &mut Vec<Polygon>) {
    match &geometry.value {
        Value::Polygon(rings) => out.push(rings_to_polygon(rings)),
        Value::MultiPolygon(multi) => {
            for rings in multi {
                out.push(rings_to_polygon(rings));
            }
        }
        Value::GeometryCollection(members) => {
            for member in members {
                collect_polygons(member, out);
            }
        }
        other => {
            warn!(kind = other.type_name(), "ignoring non-polygon boundary geometry");
        }
    }
}

fn rings_to_polygon(rings: &[Vec<Vec<f64>>]) -> Polygon {
    Polygon {
        rings: rings
            .iter()
            .map(|ring| {
                ring.iter()
                    .filter(|pos| pos.len() >= 2)
                    .map(|pos| (pos[0], pos[1]))
                    .collect()
            })
            .collect(),
    }
}

/// Clip `raster` to `boundary`, cropping to the boundary bounding box and
/// masking out-of-polygon cells with the sentinel.
///
/// # Errors
/// `Clip` when the boundary does not intersect the raster extent.
pub fn clip(raster: &Raster, boundary: &Boundary) -> Result<Raster> {
    let geom = &raster.geometry;
    let extent = geom.extent();
    let bbox = boundary.bbox();

    if bbox.min_x >= extent.max_x
        || bbox.max_x <= extent.min_x
        || bbox.min_y >= extent.max_y
        || bbox.max_y <= extent.min_y
    {
        return Err(Error::Clip(
            "boundary does not intersect the raster extent".into(),
        ));
    }

    let cs = geom.pixel_size;
    // Snap the crop window to the source grid so cells stay aligned.
    let col0 = (((bbox.min_x - geom.origin_x) / cs).floor().max(0.0)) as usize;
    let row0 = (((geom.origin_y - bbox.max_y) / cs).floor().max(0.0)) as usize;
    let col1 = ((((bbox.max_x - geom.origin_x) / cs).ceil()) as usize).min(geom.width);
    let row1 = ((((geom.origin_y - bbox.min_y) / cs).ceil()) as usize).min(geom.height);

    let out_geometry = GridGeometry {
        origin_x: geom.origin_x + col0 as f64 * cs,
        origin_y: geom.origin_y - row0 as f64 * cs,
        pixel_size: cs,
        width: col1 - col0,
        height: row1 - row0,
    };

    let mut out = Raster::filled_nodata(out_geometry, raster.epsg);
    for row in 0..out_geometry.height {
        for col in 0..out_geometry.width {
            let value = raster.get(row0 + row, col0 + col);
            if raster.is_nodata(value) {
                continue;
            }
            let (x, y) = out_geometry.cell_center(row, col);
            if boundary.contains(x, y) {
                out.set(row, col, value);
            }
        }
    }
    Ok(out)
}
