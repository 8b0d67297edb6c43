//! The seam between protocol clients and the download orchestrator.
//!
//! Exactly two implementations exist: the quadtree imagery client
//! ([`crate::provider::earth::EarthClient`]) and the tile-archive client
//! ([`crate::provider::wayback::WaybackClient`]). Each enumerates tiles in
//! its own coordinate family; the orchestrator never assumes a family.

use chrono::NaiveDate;

use crate::coord::{BoundingBox, Tile, TILE_SIZE};

use super::types::ProviderError;

/// A dated tile imagery source.
///
/// Implementations are thread-safe; the orchestrator calls [`fetch`] from
/// multiple workers concurrently.
///
/// [`fetch`]: TileSource::fetch
pub trait TileSource: Send + Sync {
    /// Short stable name, used for cache keys and log lines.
    fn name(&self) -> &str;

    /// Edge length in pixels of tiles returned by [`TileSource::fetch`].
    fn tile_size(&self) -> u32 {
        TILE_SIZE
    }

    /// Tiles of this source's coordinate family covering the bounding box.
    fn tiles_for(&self, bbox: &BoundingBox, zoom: u8) -> Result<Vec<Tile>, ProviderError>;

    /// Imagery dates available over the viewport, newest first.
    fn available_dates(
        &self,
        bbox: &BoundingBox,
        zoom: u8,
    ) -> Result<Vec<NaiveDate>, ProviderError>;

    /// Fetch the encoded tile image for a date, applying this source's
    /// fallback policy. The returned bytes are an encoded image (JPEG/PNG).
    fn fetch(&self, tile: &Tile, date: NaiveDate) -> Result<Vec<u8>, ProviderError>;

    /// Fetch the newest imagery available for a tile, ignoring dates.
    fn fetch_latest(&self, tile: &Tile) -> Result<Vec<u8>, ProviderError>;

    /// The date-or-epoch token distinguishing this (tile, date) in the
    /// cache. Must be stable across sessions for cache hits to occur.
    fn cache_token(&self, tile: &Tile, date: NaiveDate) -> String;

    /// Cache token counterpart for [`TileSource::fetch_latest`].
    fn latest_token(&self) -> String;
}
