//! Coordinate types shared across the library.
//!
//! Two independent tile families exist and must never be mixed implicitly:
//!
//! - [`XyzTile`] - standard Web Mercator slippy tiles, row 0 at the north
//!   edge. Used by the Wayback archive and by caller-facing bounding boxes.
//! - [`GridTile`] - the quadtree provider's linear Plate Carree grid, row 0
//!   at the south edge. The grid spans 360 degrees on both axes, so rows
//!   outside the +-90 latitude band simply never carry imagery.
//!
//! The [`Tile`] enum is the closed set of both families; conversions between
//! them are explicit functions in [`crate::coord`].

use std::fmt;

use thiserror::Error;

/// Minimum latitude representable in Web Mercator (degrees).
pub const MIN_LAT: f64 = -85.05112878;

/// Maximum latitude representable in Web Mercator (degrees).
pub const MAX_LAT: f64 = 85.05112878;

/// Minimum longitude (degrees).
pub const MIN_LON: f64 = -180.0;

/// Maximum longitude (degrees).
pub const MAX_LON: f64 = 180.0;

/// Maximum supported zoom level across both providers.
pub const MAX_ZOOM: u8 = 23;

/// Tile edge length in pixels for both providers.
pub const TILE_SIZE: u32 = 256;

/// Errors from coordinate validation and conversion.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    /// Latitude outside the valid range for the requested conversion.
    #[error("invalid latitude: {0}")]
    InvalidLatitude(f64),

    /// Longitude outside [-180, 180].
    #[error("invalid longitude: {0}")]
    InvalidLongitude(f64),

    /// Zoom level beyond [`MAX_ZOOM`].
    #[error("invalid zoom level: {0}")]
    InvalidZoom(u8),

    /// Degenerate bounding box (south >= north or west >= east).
    #[error("degenerate bounding box: south={south} west={west} north={north} east={east}")]
    DegenerateBounds {
        south: f64,
        west: f64,
        north: f64,
        east: f64,
    },

    /// A quadtree path contained a character other than 0-3 or was too long.
    #[error("invalid quadtree path: {0:?}")]
    InvalidPath(String),
}

/// Geographic bounding box in WGS84 degrees.
///
/// Invariants enforced at construction: `south < north`, `west < east`,
/// latitude within the Web Mercator band, longitude within [-180, 180].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    /// Create a validated bounding box.
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Result<Self, CoordError> {
        if !(MIN_LAT..=MAX_LAT).contains(&south) {
            return Err(CoordError::InvalidLatitude(south));
        }
        if !(MIN_LAT..=MAX_LAT).contains(&north) {
            return Err(CoordError::InvalidLatitude(north));
        }
        if !(MIN_LON..=MAX_LON).contains(&west) {
            return Err(CoordError::InvalidLongitude(west));
        }
        if !(MIN_LON..=MAX_LON).contains(&east) {
            return Err(CoordError::InvalidLongitude(east));
        }
        if south >= north || west >= east {
            return Err(CoordError::DegenerateBounds {
                south,
                west,
                north,
                east,
            });
        }
        Ok(Self {
            south,
            west,
            north,
            east,
        })
    }

    /// Center point as (lat, lon).
    pub fn center(&self) -> (f64, f64) {
        (
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }

    /// The center plus the four quadrant centers, used for viewport
    /// date-availability sampling.
    pub fn sample_points(&self) -> [(f64, f64); 5] {
        let (clat, clon) = self.center();
        let qlat = (self.north - self.south) / 4.0;
        let qlon = (self.east - self.west) / 4.0;
        [
            (clat, clon),
            (clat + qlat, clon - qlon),
            (clat + qlat, clon + qlon),
            (clat - qlat, clon - qlon),
            (clat - qlat, clon + qlon),
        ]
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.6},{:.6},{:.6},{:.6}]",
            self.south, self.west, self.north, self.east
        )
    }
}

/// Standard Web Mercator XYZ tile. Row 0 is the northernmost row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XyzTile {
    pub col: u32,
    pub row: u32,
    pub zoom: u8,
}

impl XyzTile {
    pub fn new(col: u32, row: u32, zoom: u8) -> Self {
        Self { col, row, zoom }
    }
}

impl fmt::Display for XyzTile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "xyz({}/{}/{})", self.zoom, self.col, self.row)
    }
}

/// Plate Carree quadtree grid tile. Row 0 is the southernmost row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridTile {
    pub col: u32,
    pub row: u32,
    pub zoom: u8,
}

impl GridTile {
    pub fn new(col: u32, row: u32, zoom: u8) -> Self {
        Self { col, row, zoom }
    }

    /// The parent tile one zoom level up.
    pub fn parent(&self) -> Option<GridTile> {
        if self.zoom == 0 {
            return None;
        }
        Some(GridTile {
            col: self.col / 2,
            row: self.row / 2,
            zoom: self.zoom - 1,
        })
    }

    /// The ancestor `levels` zoom levels up.
    pub fn ancestor(&self, levels: u8) -> Option<GridTile> {
        if levels > self.zoom {
            return None;
        }
        Some(GridTile {
            col: self.col >> levels,
            row: self.row >> levels,
            zoom: self.zoom - levels,
        })
    }
}

impl fmt::Display for GridTile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "grid({}/{}/{})", self.zoom, self.col, self.row)
    }
}

/// A tile in either coordinate family.
///
/// A `Tile` is a pure coordinate key; it never carries pixel data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tile {
    Xyz(XyzTile),
    Grid(GridTile),
}

impl Tile {
    pub fn col(&self) -> u32 {
        match self {
            Tile::Xyz(t) => t.col,
            Tile::Grid(t) => t.col,
        }
    }

    pub fn row(&self) -> u32 {
        match self {
            Tile::Xyz(t) => t.row,
            Tile::Grid(t) => t.row,
        }
    }

    pub fn zoom(&self) -> u8 {
        match self {
            Tile::Xyz(t) => t.zoom,
            Tile::Grid(t) => t.zoom,
        }
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tile::Xyz(t) => t.fmt(f),
            Tile::Grid(t) => t.fmt(f),
        }
    }
}

/// Base-4 digit string addressing a tile in the quadtree provider's grid.
///
/// One digit per zoom level; the empty path addresses the zoom-0 root.
/// Digit assignment per level (row counted from the south):
///
/// ```text
/// 3 | 2
/// --+--
/// 0 | 1
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuadtreePath(String);

impl QuadtreePath {
    /// Parse a digit string, rejecting characters outside 0-3.
    pub fn parse(s: &str) -> Result<Self, CoordError> {
        if s.len() > MAX_ZOOM as usize || s.bytes().any(|b| !(b'0'..=b'3').contains(&b)) {
            return Err(CoordError::InvalidPath(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Build from raw digits without validation. Internal use only.
    pub(crate) fn from_digits(digits: String) -> Self {
        debug_assert!(digits.bytes().all(|b| (b'0'..=b'3').contains(&b)));
        Self(digits)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Zoom level addressed by this path.
    pub fn zoom(&self) -> u8 {
        self.0.len() as u8
    }

    /// The path truncated to `zoom` levels.
    pub fn truncated(&self, zoom: u8) -> QuadtreePath {
        let len = (zoom as usize).min(self.0.len());
        QuadtreePath(self.0[..len].to_string())
    }

    /// Iterate digits as 0..=3 values.
    pub fn digits(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.bytes().map(|b| b - b'0')
    }
}

impl fmt::Display for QuadtreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Axis-aligned bounds in Web Mercator meters (EPSG:3857).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MercatorBounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl MercatorBounds {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}
