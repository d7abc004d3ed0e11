//! GeoTIFF reading and writing for single-band `f32` rasters.
//!
//! Writing uses the pure-Rust `tiff` encoder with the GeoTIFF tags a GIS
//! needs to place the grid: ModelPixelScale, ModelTiepoint, a GeoKey
//! directory naming the EPSG code, and the GDAL_NODATA convention tag.
//! Reading is the inverse: it recovers the pixel buffer and the
//! [`GridGeometry`] from those tags, which is how the reference snap raster
//! fixes the output grid template.

use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, Write};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::{Compression, TiffEncoder};
use tiff::tags::Tag;

use crate::error::{Error, Result};
use crate::raster::{GridGeometry, Raster, NODATA};

// GeoTIFF tag IDs (not in the standard tiff crate)
const GEOTIFF_MODELPIXELSCALE: u16 = 33550;
const GEOTIFF_MODELTIEPOINT: u16 = 33922;
const GEOTIFF_GEOKEYDIRECTORY: u16 = 34735;
const GEOTIFF_GEOASCIIPARAMS: u16 = 34737;
const GDAL_NODATA: u16 = 42113;

// GeoKey IDs
const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;

// GeoKey values
const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// Compression method for GeoTIFF output.
#[derive(Debug, Clone, Copy, Default)]
pub enum GeoTiffCompression {
    /// No compression, fastest but largest files.
    #[default]
    None,
    /// LZW compression.
    Lzw,
    /// Deflate (zlib) compression.
    Deflate,
}

/// Builder for writing a [`Raster`] as a GeoTIFF.
pub struct GeoTiffWriter<'a> {
    raster: &'a Raster,
    compression: GeoTiffCompression,
}

impl<'a> GeoTiffWriter<'a> {
    #[must_use]
    pub fn new(raster: &'a Raster) -> Self {
        Self {
            raster,
            compression: GeoTiffCompression::default(),
        }
    }

    /// Set the compression method.
    #[must_use]
    pub fn compression(mut self, compression: GeoTiffCompression) -> Self {
        self.compression = compression;
        self
    }

    /// Write to a file path.
    ///
    /// # Errors
    /// Returns an error when the raster is empty or encoding fails.
    pub fn write<P: AsRef<Path>>(self, path: P) -> Result<()> {
        let file = File::create(path)?;
        self.write_to(BufWriter::new(file))
    }

    /// Write to any `Write + Seek` target.
    ///
    /// # Errors
    /// Returns an error when the raster is empty or encoding fails.
    pub fn write_to<W: Write + Seek>(self, writer: W) -> Result<()> {
        let raster = self.raster;
        let geom = &raster.geometry;

        if geom.width == 0 || geom.height == 0 || raster.pixels.is_empty() {
            return Err(Error::Format {
                path: "<memory>".into(),
                reason: "raster has no pixel data".into(),
            });
        }

        let compression = match self.compression {
            GeoTiffCompression::None => Compression::Uncompressed,
            GeoTiffCompression::Lzw => Compression::Lzw,
            GeoTiffCompression::Deflate => Compression::Deflate(tiff::encoder::DeflateLevel::Fast),
        };

        let mut encoder = TiffEncoder::new(writer)?.with_compression(compression);
        let mut image = encoder.new_image::<Gray32Float>(geom.width as u32, geom.height as u32)?;
        write_geo_tags(image.encoder(), raster)?;
        image.write_data(&raster.pixels)?;
        Ok(())
    }
}

fn write_geo_tags<W: Write + Seek, K: tiff::encoder::TiffKind>(
    dir: &mut tiff::encoder::DirectoryEncoder<W, K>,
    raster: &Raster,
) -> Result<()> {
    let geom = &raster.geometry;

    // ModelPixelScale: [ScaleX, ScaleY, ScaleZ]
    let pixel_scale = [geom.pixel_size, geom.pixel_size, 0.0];
    dir.write_tag(Tag::Unknown(GEOTIFF_MODELPIXELSCALE), pixel_scale.as_slice())?;

    // ModelTiepoint ties pixel (0, 0) to the upper-left corner.
    let tiepoint = [0.0, 0.0, 0.0, geom.origin_x, geom.origin_y, 0.0];
    dir.write_tag(Tag::Unknown(GEOTIFF_MODELTIEPOINT), tiepoint.as_slice())?;

    let geokeys = build_geokey_directory(raster.epsg);
    dir.write_tag(Tag::Unknown(GEOTIFF_GEOKEYDIRECTORY), geokeys.as_slice())?;

    if let Some(proj_string) = crate::reproject::proj_string(raster.epsg) {
        // GeoAsciiParams is pipe-delimited ASCII.
        let ascii_params = format!("{proj_string}|");
        dir.write_tag(Tag::Unknown(GEOTIFF_GEOASCIIPARAMS), ascii_params.as_bytes())?;
    }

    // GDAL convention: nodata as an ASCII tag.
    let nodata = format!("{}", raster.nodata);
    dir.write_tag(Tag::Unknown(GDAL_NODATA), nodata.as_bytes())?;

    Ok(())
}

fn build_geokey_directory(epsg: u16) -> Vec<u16> {
    // [KeyDirectoryVersion, KeyRevision, MinorRevision, NumberOfKeys, then
    //  per key: KeyID, TIFFTagLocation, Count, Value]
    let is_geographic = crate::reproject::is_geographic_crs(epsg);

    let mut keys = vec![1, 1, 0, 3];
    keys.extend_from_slice(&[
        GT_MODEL_TYPE_GEO_KEY,
        0,
        1,
        if is_geographic {
            MODEL_TYPE_GEOGRAPHIC
        } else {
            MODEL_TYPE_PROJECTED
        },
    ]);
    keys.extend_from_slice(&[GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA]);
    if is_geographic {
        keys.extend_from_slice(&[GEOGRAPHIC_TYPE_GEO_KEY, 0, 1, epsg]);
    } else {
        keys.extend_from_slice(&[PROJECTED_CS_TYPE_GEO_KEY, 0, 1, epsg]);
    }
    keys
}

impl Raster {
    /// Write this raster to a GeoTIFF file, uncompressed.
    ///
    /// # Errors
    /// Returns an error when the raster is empty or encoding fails.
    pub fn write_geotiff<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        GeoTiffWriter::new(self).write(path)
    }

    /// Write this raster to an in-memory GeoTIFF.
    ///
    /// # Errors
    /// Returns an error when the raster is empty or encoding fails.
    pub fn to_geotiff_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        GeoTiffWriter::new(self).write_to(&mut buffer)?;
        Ok(buffer.into_inner())
    }
}

/// Grid template derived from a reference raster: geometry, CRS and extent.
#[derive(Debug, Clone, Copy)]
pub struct SnapGrid {
    pub geometry: GridGeometry,
    pub epsg: u16,
}

impl SnapGrid {
    /// Derive the full grid template from a GeoTIFF header: geotransform,
    /// projection, extent and cell size, without decoding pixel data.
    ///
    /// # Errors
    /// Returns an error when the file cannot be opened or lacks
    /// georeferencing tags.
    pub fn from_geotiff<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut decoder = Decoder::new(BufReader::new(file))?;
        let (geometry, epsg, _) = read_header(&mut decoder, path)?;
        Ok(Self { geometry, epsg })
    }
}

/// Read a single-band GeoTIFF into a [`Raster`].
///
/// Pixel values equal to the file's GDAL_NODATA value are normalized to the
/// pipeline sentinel.
///
/// # Errors
/// Returns an error on malformed files, unsupported sample formats, or
/// missing georeferencing tags.
pub fn read_geotiff<P: AsRef<Path>>(path: P) -> Result<Raster> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut decoder = Decoder::new(BufReader::new(file))?;
    let (geometry, epsg, file_nodata) = read_header(&mut decoder, path)?;

    let pixels: Vec<f32> = match decoder.read_image()? {
        DecodingResult::F32(data) => data,
        DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U8(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::U16(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::I16(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
        _ => {
            return Err(Error::format(path, "unsupported GeoTIFF sample format"));
        }
    };

    if pixels.len() != geometry.width * geometry.height {
        return Err(Error::format(
            path,
            format!(
                "pixel count {} does not match {}x{} (multi-band input?)",
                pixels.len(),
                geometry.width,
                geometry.height
            ),
        ));
    }

    // Normalize the file's declared nodata to the pipeline sentinel.
    let pixels = match file_nodata {
        Some(nd) => pixels
            .into_iter()
            .map(|v| if v == nd || v.is_nan() { NODATA } else { v })
            .collect(),
        None => pixels,
    };

    Ok(Raster {
        pixels,
        geometry,
        epsg,
        nodata: NODATA,
    })
}

fn read_header<R: std::io::Read + Seek>(
    decoder: &mut Decoder<R>,
    path: &Path,
) -> Result<(GridGeometry, u16, Option<f32>)> {
    let (width, height) = decoder.dimensions()?;

    let scale = decoder
        .find_tag(Tag::Unknown(GEOTIFF_MODELPIXELSCALE))?
        .ok_or_else(|| Error::format(path, "missing ModelPixelScale tag"))?
        .into_f64_vec()?;
    let tiepoint = decoder
        .find_tag(Tag::Unknown(GEOTIFF_MODELTIEPOINT))?
        .ok_or_else(|| Error::format(path, "missing ModelTiepoint tag"))?
        .into_f64_vec()?;

    if scale.len() < 2 || tiepoint.len() < 5 {
        return Err(Error::format(path, "malformed georeferencing tags"));
    }
    // Source data is uniform-grid only; reject anisotropic pixels instead of
    // silently picking one axis.
    if (scale[0] - scale[1]).abs() > 1e-9 * scale[0].abs() {
        return Err(Error::format(
            path,
            format!("non-square pixels ({} x {}) are not supported", scale[0], scale[1]),
        ));
    }

    let geometry = GridGeometry {
        origin_x: tiepoint[3],
        origin_y: tiepoint[4],
        pixel_size: scale[0],
        width: width as usize,
        height: height as usize,
    };

    let epsg = decoder
        .find_tag(Tag::Unknown(GEOTIFF_GEOKEYDIRECTORY))?
        .map(|v| v.into_u16_vec())
        .transpose()?
        .and_then(|keys| epsg_from_geokeys(&keys))
        .ok_or_else(|| Error::format(path, "missing or unreadable GeoKey directory"))?;

    let file_nodata = decoder
        .find_tag(Tag::Unknown(GDAL_NODATA))?
        .and_then(|v| v.into_string().ok())
        .and_then(|s| s.trim_end_matches('\0').trim().parse::<f32>().ok());

    Ok((geometry, epsg, file_nodata))
}

fn epsg_from_geokeys(keys: &[u16]) -> Option<u16> {
    // Entries start after the 4-value header, 4 values each.
    for entry in keys.get(4..)?.chunks_exact(4) {
        let (key_id, location, value) = (entry[0], entry[1], entry[3]);
        if location == 0
            && (key_id == PROJECTED_CS_TYPE_GEO_KEY || key_id == GEOGRAPHIC_TYPE_GEO_KEY)
        {
            return Some(value);
        }
    }
    None
}
