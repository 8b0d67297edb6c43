//! Tile mosaic assembly and georeferencing
//!
//! Takes the per-tile payloads a download job produced and assembles one
//! raster: the minimal enclosing tile rectangle is computed, a buffer of
//! (cols x 256, rows x 256) RGBA pixels is allocated, and each tile is
//! blitted at its disjoint offset. Tiles that failed to download simply
//! leave their region transparent.
//!
//! The two coordinate families disagree about which way rows grow; the
//! blit reconciles that here so raster row 0 is always the northernmost
//! row. Georeferencing (origin + per-pixel scale in Web Mercator meters)
//! comes from the tile rectangle via the coordinate module and is written
//! into the output by [`geotiff`].

pub mod geotiff;

use image::{Rgba, RgbaImage};
use thiserror::Error;
use tracing::debug;

use crate::coord::{
    grid_mercator_bounds, xyz_mercator_bounds, GridTile, MercatorBounds, Tile, XyzTile, TILE_SIZE,
};

/// Errors that can occur while assembling or writing a mosaic.
#[derive(Debug, Error)]
pub enum StitchError {
    /// No tiles were supplied.
    #[error("cannot stitch an empty tile set")]
    Empty,

    /// Tiles from both coordinate families in one set.
    #[error("cannot stitch tiles from different coordinate families")]
    MixedFamilies,

    /// Tiles at different zoom levels in one set.
    #[error("cannot stitch tiles at mixed zoom levels ({0} and {1})")]
    MixedZooms(u8, u8),

    /// A tile payload that could not be decoded as an image.
    #[error("tile {tile} could not be decoded: {reason}")]
    TileDecode { tile: String, reason: String },

    /// I/O error writing the output raster.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TIFF encoding error.
    #[error("TIFF encoding error: {0}")]
    TiffEncode(String),
}

impl From<tiff::TiffError> for StitchError {
    fn from(e: tiff::TiffError) -> Self {
        StitchError::TiffEncode(e.to_string())
    }
}

/// A georeferenced raster assembled from one tile rectangle.
pub struct Mosaic {
    pub image: RgbaImage,
    /// Web Mercator meter bounds of the full raster.
    pub bounds: MercatorBounds,
    pub zoom: u8,
    /// Tiles actually blitted (the rest of the rectangle is transparent).
    pub tiles_filled: usize,
}

impl Mosaic {
    /// Meters per pixel, x then y.
    pub fn pixel_scale(&self) -> (f64, f64) {
        (
            self.bounds.width() / self.image.width() as f64,
            self.bounds.height() / self.image.height() as f64,
        )
    }
}

/// The minimal enclosing (col, row) rectangle over a tile set.
struct TileRect {
    min_col: u32,
    max_col: u32,
    min_row: u32,
    max_row: u32,
}

impl TileRect {
    fn enclose(tiles: &[Tile]) -> Self {
        let mut rect = TileRect {
            min_col: u32::MAX,
            max_col: 0,
            min_row: u32::MAX,
            max_row: 0,
        };
        for tile in tiles {
            rect.min_col = rect.min_col.min(tile.col());
            rect.max_col = rect.max_col.max(tile.col());
            rect.min_row = rect.min_row.min(tile.row());
            rect.max_row = rect.max_row.max(tile.row());
        }
        rect
    }

    fn cols(&self) -> u32 {
        self.max_col - self.min_col + 1
    }

    fn rows(&self) -> u32 {
        self.max_row - self.min_row + 1
    }
}

/// Assemble one raster from tile payloads.
///
/// `tiles` holds every tile of the job with `Some(bytes)` for successful
/// fetches and `None` for gaps. All tiles must share one coordinate family
/// and zoom level.
pub fn stitch(tiles: &[(Tile, Option<Vec<u8>>)]) -> Result<Mosaic, StitchError> {
    if tiles.is_empty() {
        return Err(StitchError::Empty);
    }

    let first = tiles[0].0;
    let zoom = first.zoom();
    for (tile, _) in tiles {
        if std::mem::discriminant(tile) != std::mem::discriminant(&first) {
            return Err(StitchError::MixedFamilies);
        }
        if tile.zoom() != zoom {
            return Err(StitchError::MixedZooms(zoom, tile.zoom()));
        }
    }

    let keys: Vec<Tile> = tiles.iter().map(|(t, _)| *t).collect();
    let rect = TileRect::enclose(&keys);
    let width = rect.cols() * TILE_SIZE;
    let height = rect.rows() * TILE_SIZE;
    let mut image = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));

    let mut tiles_filled = 0usize;
    for (tile, payload) in tiles {
        let Some(bytes) = payload else { continue };
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| StitchError::TileDecode {
                tile: tile.to_string(),
                reason: e.to_string(),
            })?
            .to_rgba8();

        let x = (tile.col() - rect.min_col) * TILE_SIZE;
        // Raster row 0 is north. XYZ rows already grow southward; grid
        // rows grow northward and flip here.
        let y = match tile {
            Tile::Xyz(t) => (t.row - rect.min_row) * TILE_SIZE,
            Tile::Grid(t) => (rect.max_row - t.row) * TILE_SIZE,
        };
        image::imageops::replace(&mut image, &decoded, x as i64, y as i64);
        tiles_filled += 1;
    }

    let bounds = rect_bounds(&first, &rect, zoom);
    debug!(
        width,
        height, tiles_filled, total = tiles.len(), "mosaic assembled"
    );
    Ok(Mosaic {
        image,
        bounds,
        zoom,
        tiles_filled,
    })
}

/// Mercator bounds of the full tile rectangle, from its corner tiles.
fn rect_bounds(family: &Tile, rect: &TileRect, zoom: u8) -> MercatorBounds {
    let (a, b) = match family {
        Tile::Xyz(_) => (
            xyz_mercator_bounds(&XyzTile::new(rect.min_col, rect.min_row, zoom)),
            xyz_mercator_bounds(&XyzTile::new(rect.max_col, rect.max_row, zoom)),
        ),
        Tile::Grid(_) => (
            grid_mercator_bounds(&GridTile::new(rect.min_col, rect.min_row, zoom)),
            grid_mercator_bounds(&GridTile::new(rect.max_col, rect.max_row, zoom)),
        ),
    };
    MercatorBounds {
        min_x: a.min_x.min(b.min_x),
        min_y: a.min_y.min(b.min_y),
        max_x: a.max_x.max(b.max_x),
        max_y: a.max_y.max(b.max_y),
    }
}
