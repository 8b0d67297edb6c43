//! Self-describing GeoTIFF output
//!
//! Writes a [`Mosaic`](super::Mosaic) as an RGBA GeoTIFF carrying its own
//! georeferencing: a model tiepoint anchoring pixel (0,0) to the raster's
//! northwest corner in Web Mercator meters, the per-pixel scale, and a
//! GeoKey directory naming the projected coordinate system. No sidecar
//! file is needed to place the raster on a map.

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use chrono::NaiveDate;
use tiff::encoder::colortype::RGBA8;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;
use tracing::info;

use super::{Mosaic, StitchError};

// GeoAsciiParams tag ID, referenced by value inside the GeoKey directory.
const TAG_GEO_ASCII_PARAMS: u16 = 34737;

// GeoKey IDs.
const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const GT_CITATION_GEO_KEY: u16 = 1026;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;

// GeoKey values.
const MODEL_TYPE_PROJECTED: u16 = 1;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// Web Mercator, the projection both providers' tile grids resolve to.
pub const EPSG_WEB_MERCATOR: u16 = 3857;

/// Free-text metadata embedded in the output file.
pub struct RasterMetadata {
    /// Goes into the ImageDescription tag.
    pub description: String,
    /// Imagery date, written into the DateTime tag.
    pub date: Option<NaiveDate>,
}

/// Write a mosaic to `path` as a georeferenced TIFF.
pub fn write_geotiff(
    mosaic: &Mosaic,
    path: &Path,
    metadata: &RasterMetadata,
) -> Result<(), StitchError> {
    let file = File::create(path)?;
    write_geotiff_to(mosaic, BufWriter::new(file), metadata)?;
    info!(
        path = %path.display(),
        width = mosaic.image.width(),
        height = mosaic.image.height(),
        "georeferenced raster written"
    );
    Ok(())
}

/// Write a mosaic to any `Write + Seek` sink.
pub fn write_geotiff_to<W: Write + Seek>(
    mosaic: &Mosaic,
    writer: W,
    metadata: &RasterMetadata,
) -> Result<(), StitchError> {
    let width = mosaic.image.width();
    let height = mosaic.image.height();
    if width == 0 || height == 0 {
        return Err(StitchError::Empty);
    }

    let mut encoder = TiffEncoder::new(writer)?;
    let mut image = encoder.new_image::<RGBA8>(width, height)?;
    write_geo_tags(image.encoder(), mosaic, metadata)?;
    image.write_data(mosaic.image.as_raw())?;
    Ok(())
}

fn write_geo_tags<W: Write + Seek, K: tiff::encoder::TiffKind>(
    dir: &mut tiff::encoder::DirectoryEncoder<W, K>,
    mosaic: &Mosaic,
    metadata: &RasterMetadata,
) -> Result<(), StitchError> {
    let (scale_x, scale_y) = mosaic.pixel_scale();
    let pixel_scale = [scale_x, scale_y, 0.0];
    dir.write_tag(Tag::ModelPixelScaleTag, pixel_scale.as_slice())?;

    // Tie raster pixel (0, 0) to the northwest corner in meters.
    let tiepoint = [0.0, 0.0, 0.0, mosaic.bounds.min_x, mosaic.bounds.max_y, 0.0];
    dir.write_tag(Tag::ModelTiepointTag, tiepoint.as_slice())?;

    // GeoKeyDirectory header is (version, revision, minor, key count).
    let geokeys: [u16; 20] = [
        1,
        1,
        0,
        4,
        GT_MODEL_TYPE_GEO_KEY,
        0,
        1,
        MODEL_TYPE_PROJECTED,
        GT_RASTER_TYPE_GEO_KEY,
        0,
        1,
        RASTER_PIXEL_IS_AREA,
        GT_CITATION_GEO_KEY,
        TAG_GEO_ASCII_PARAMS,
        12,
        0,
        PROJECTED_CS_TYPE_GEO_KEY,
        0,
        1,
        EPSG_WEB_MERCATOR,
    ];
    dir.write_tag(Tag::GeoKeyDirectoryTag, geokeys.as_slice())?;

    // Citation text; pipe-terminated per the GeoTIFF ASCII rules.
    dir.write_tag(Tag::GeoAsciiParamsTag, "WGS 84 / PM|".as_bytes())?;

    dir.write_tag(Tag::ImageDescription, metadata.description.as_str())?;
    if let Some(date) = metadata.date {
        // TIFF DateTime format is "YYYY:MM:DD HH:MM:SS".
        let stamp = format!("{} 00:00:00", date.format("%Y:%m:%d"));
        dir.write_tag(Tag::DateTime, stamp.as_str())?;
    }
    Ok(())
}
