//! Quadtree imagery client
//!
//! Speaks the encrypted quadtree protocol: root descriptors, metadata
//! packets, and dated tile fetches. Two sessions are established at
//! connect time - current and historical imagery - each with its own key
//! and quadtree version (see [`session`]).
//!
//! Historical fetches layer two fallbacks, both bounded:
//!
//! - the epoch candidate walk of [`epoch`], because metadata and pixel
//!   storage disagree at high zoom for recent dates;
//! - a zoom walk (3 levels, 6 below zoom 17) that fetches an ancestor tile
//!   and crops/upscales the quadrant covering the requested tile.

mod crypto;
mod dates;
mod dbroot;
mod epoch;
mod packet;
mod session;

pub use dates::PackedDate;
pub use epoch::KNOWN_GOOD_EPOCHS;
pub use packet::{DatedEntry, TileMetadata};
pub use session::{EarthSession, Flavor};

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use chrono::NaiveDate;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::coord::{
    grid_tiles_in, grid_to_path, to_grid_tile, BoundingBox, GridTile, QuadtreePath, Tile,
    TILE_SIZE,
};
use crate::provider::{HttpClient, ProviderError, TileSource};

use packet::{packet_root_for, parse_packet, QuadtreePacket};

/// Default endpoint for the current-imagery database.
pub const CURRENT_BASE_URL: &str = "https://khm.google.com";

/// Default endpoint for the historical-imagery database.
pub const HISTORICAL_BASE_URL: &str = "https://khmdb.google.com";

/// Metadata is materially less reliable above this zoom; date discovery
/// samples here instead when asked about deeper viewports.
pub const METADATA_MAX_ZOOM: u8 = 16;

/// Fraction of sampled tiles that must report a date for it to count as
/// available over the viewport.
const DATE_AGREEMENT: f64 = 0.6;

/// Zoom fallback depth for historical fetches.
const ZOOM_FALLBACK: u8 = 3;

/// Deeper fallback used below this zoom, where coarser imagery is dense.
const ZOOM_FALLBACK_DEEP: u8 = 6;
const DEEP_FALLBACK_BELOW: u8 = 17;

/// Client for the quadtree imagery service.
pub struct EarthClient<C: HttpClient> {
    http: C,
    current_base: String,
    historical_base: String,
    current: EarthSession,
    historical: EarthSession,
    /// Metadata packets already fetched this session, keyed by root path.
    packets: Mutex<HashMap<String, Arc<QuadtreePacket>>>,
    known_good_epochs: Vec<u32>,
}

impl<C: HttpClient> EarthClient<C> {
    /// Connect to the default endpoints, establishing both sessions.
    pub fn connect(http: C) -> Result<Self, ProviderError> {
        Self::connect_to(http, CURRENT_BASE_URL, HISTORICAL_BASE_URL)
    }

    /// Connect to explicit endpoints (used by tests and mirrors).
    pub fn connect_to(
        http: C,
        current_base: &str,
        historical_base: &str,
    ) -> Result<Self, ProviderError> {
        let current = EarthSession::establish(&http, current_base, Flavor::Current)?;
        let historical = EarthSession::establish(&http, historical_base, Flavor::Historical)?;
        Ok(Self {
            http,
            current_base: current_base.to_string(),
            historical_base: historical_base.to_string(),
            current,
            historical,
            packets: Mutex::new(HashMap::new()),
            known_good_epochs: KNOWN_GOOD_EPOCHS.to_vec(),
        })
    }

    /// Override the known-good epoch list (layer 3 of the epoch policy).
    pub fn with_known_good_epochs(mut self, epochs: Vec<u32>) -> Self {
        self.known_good_epochs = epochs;
        self
    }

    pub fn current_session(&self) -> &EarthSession {
        &self.current
    }

    pub fn historical_session(&self) -> &EarthSession {
        &self.historical
    }

    /// Fetch (or reuse) the metadata packet rooted at `root`.
    fn packet(&self, root: &QuadtreePath) -> Result<Arc<QuadtreePacket>, ProviderError> {
        if let Some(packet) = self.packets.lock().get(root.as_str()) {
            return Ok(Arc::clone(packet));
        }

        let url = format!(
            "{}/flatfile?db=tm&q2-0{}-q.{}",
            self.historical_base,
            root.as_str(),
            self.historical.quadtree_version()
        );
        let wire = self.http.get(&url)?;
        let plain = self.historical.open_packet(&wire)?;
        let packet = Arc::new(parse_packet(&plain)?);

        self.packets
            .lock()
            .insert(root.as_str().to_string(), Arc::clone(&packet));
        Ok(packet)
    }

    /// Date/epoch metadata for a tile. HTTP failures degrade to `None`
    /// (the epoch policy still has its known-good layer); decode failures
    /// are hard errors.
    pub fn metadata_for(&self, tile: &GridTile) -> Result<Option<TileMetadata>, ProviderError> {
        let path = grid_to_path(tile);
        let (root, subpath) = packet_root_for(&path);
        if subpath.is_empty() {
            return Ok(None);
        }
        match self.packet(&root) {
            Ok(packet) => Ok(packet.node(&subpath).cloned()),
            Err(e @ ProviderError::Decode(_)) => Err(e),
            Err(e) => {
                warn!(tile = %tile, error = %e, "metadata fetch failed, continuing without");
                Ok(None)
            }
        }
    }

    /// One dated tile fetch attempt at a specific epoch. No fallback.
    fn fetch_at_epoch(
        &self,
        path: &QuadtreePath,
        epoch: u32,
        date: PackedDate,
    ) -> Result<Vec<u8>, ProviderError> {
        let url = format!(
            "{}/flatfile?db=tm&f1-0{}-i.{}-{}",
            self.historical_base,
            path.as_str(),
            epoch,
            date.hex_token()
        );
        self.http.get(&url)
    }

    /// Historical fetch at the tile's own zoom: the epoch candidate walk.
    fn fetch_with_epoch_policy(
        &self,
        tile: &GridTile,
        date: PackedDate,
    ) -> Result<Vec<u8>, ProviderError> {
        let meta = self.metadata_for(tile)?;
        let candidates = epoch::epoch_candidates(meta.as_ref(), date, &self.known_good_epochs);
        if candidates.is_empty() {
            return Err(ProviderError::NoImagery {
                date: date.to_string(),
                context: tile.to_string(),
            });
        }

        let path = grid_to_path(tile);
        for epoch in &candidates {
            match self.fetch_at_epoch(&path, *epoch, date) {
                Ok(bytes) => {
                    debug!(tile = %tile, epoch, "historical tile fetched");
                    return Ok(bytes);
                }
                Err(e) if e.is_transient() => {
                    debug!(tile = %tile, epoch, error = %e, "epoch candidate failed");
                }
                Err(e) => return Err(e),
            }
        }

        Err(ProviderError::NoImagery {
            date: date.to_string(),
            context: format!("{} (epochs tried: {:?})", tile, candidates),
        })
    }

    /// Full historical fetch: epoch policy, then the bounded zoom walk.
    pub fn fetch_historical(
        &self,
        tile: &GridTile,
        date: PackedDate,
    ) -> Result<Vec<u8>, ProviderError> {
        match self.fetch_with_epoch_policy(tile, date) {
            Ok(bytes) => return Ok(bytes),
            Err(e) if e.is_transient() => {
                debug!(tile = %tile, error = %e, "falling back to coarser zooms");
            }
            Err(e) => return Err(e),
        }

        let max_levels = if tile.zoom < DEEP_FALLBACK_BELOW {
            ZOOM_FALLBACK_DEEP
        } else {
            ZOOM_FALLBACK
        };

        for levels in 1..=max_levels {
            let Some(ancestor) = tile.ancestor(levels) else {
                break;
            };
            match self.fetch_with_epoch_policy(&ancestor, date) {
                Ok(bytes) => {
                    debug!(tile = %tile, levels, "serving upscaled ancestor quadrant");
                    return upscale_quadrant(&bytes, tile, &ancestor, levels);
                }
                Err(e) if e.is_transient() => continue,
                Err(e) => return Err(e),
            }
        }

        Err(ProviderError::NoImagery {
            date: date.to_string(),
            context: format!("{} (zoom fallback exhausted after {})", tile, max_levels),
        })
    }

    /// Latest imagery for a tile via the current-imagery session.
    pub fn fetch_current(&self, tile: &GridTile) -> Result<Vec<u8>, ProviderError> {
        let path = grid_to_path(tile);
        let url = format!(
            "{}/flatfile?f1-0{}-i.{}",
            self.current_base,
            path.as_str(),
            self.current.quadtree_version()
        );
        self.http.get(&url)
    }

    /// Dates with imagery over the viewport, newest first.
    ///
    /// Samples the viewport center plus the four quadrant centers, at the
    /// requested zoom capped to [`METADATA_MAX_ZOOM`]. A date counts when
    /// at least 60% of the distinct sampled tiles report it; when that
    /// filter comes back empty, the union of all sampled dates is used.
    pub fn discover_dates(
        &self,
        bbox: &BoundingBox,
        zoom: u8,
    ) -> Result<Vec<NaiveDate>, ProviderError> {
        let meta_zoom = zoom.min(METADATA_MAX_ZOOM);

        let mut sample_tiles: Vec<GridTile> = Vec::new();
        for (lat, lon) in bbox.sample_points() {
            let tile = to_grid_tile(lat, lon, meta_zoom)?;
            if !sample_tiles.contains(&tile) {
                sample_tiles.push(tile);
            }
        }

        let mut counts: HashMap<PackedDate, usize> = HashMap::new();
        for tile in &sample_tiles {
            if let Some(meta) = self.metadata_for(tile)? {
                for date in meta.dates() {
                    *counts.entry(date).or_insert(0) += 1;
                }
            }
        }

        let total = sample_tiles.len();
        let threshold = DATE_AGREEMENT * total as f64;
        let mut agreed: Vec<PackedDate> = counts
            .iter()
            .filter(|(_, &n)| n as f64 >= threshold)
            .map(|(&d, _)| d)
            .collect();
        if agreed.is_empty() {
            agreed = counts.keys().copied().collect();
        }

        agreed.sort_unstable();
        agreed.reverse();
        Ok(agreed.into_iter().filter_map(|d| d.to_naive_date()).collect())
    }
}

/// Crop the quadrant of a coarser ancestor tile covering `tile` and scale
/// it back up to the standard tile size.
fn upscale_quadrant(
    bytes: &[u8],
    tile: &GridTile,
    ancestor: &GridTile,
    levels: u8,
) -> Result<Vec<u8>, ProviderError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| ProviderError::Decode(format!("ancestor tile not an image: {}", e)))?;

    let sub = TILE_SIZE >> levels;
    if sub == 0 {
        return Err(ProviderError::Decode(format!(
            "zoom fallback of {} levels leaves no pixels",
            levels
        )));
    }

    let span = 1u32 << levels;
    let dx = tile.col - (ancestor.col << levels);
    let dy_from_south = tile.row - (ancestor.row << levels);
    // Image rows run north to south; grid rows run south to north.
    let px = dx * sub;
    let py = (span - 1 - dy_from_south) * sub;

    let quadrant = img.crop_imm(px, py, sub, sub);
    let scaled = image::imageops::resize(
        &quadrant.to_rgba8(),
        TILE_SIZE,
        TILE_SIZE,
        FilterType::Triangle,
    );

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(scaled)
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| ProviderError::Decode(format!("re-encode failed: {}", e)))?;
    Ok(out.into_inner())
}

impl<C: HttpClient> TileSource for EarthClient<C> {
    fn name(&self) -> &str {
        "earth"
    }

    fn tiles_for(&self, bbox: &BoundingBox, zoom: u8) -> Result<Vec<Tile>, ProviderError> {
        Ok(grid_tiles_in(bbox, zoom)?.into_iter().map(Tile::Grid).collect())
    }

    fn available_dates(
        &self,
        bbox: &BoundingBox,
        zoom: u8,
    ) -> Result<Vec<NaiveDate>, ProviderError> {
        self.discover_dates(bbox, zoom)
    }

    fn fetch(&self, tile: &Tile, date: NaiveDate) -> Result<Vec<u8>, ProviderError> {
        match tile {
            Tile::Grid(grid) => self.fetch_historical(grid, PackedDate::from_naive_date(date)),
            Tile::Xyz(_) => Err(ProviderError::UnsupportedTile(tile.to_string())),
        }
    }

    fn fetch_latest(&self, tile: &Tile) -> Result<Vec<u8>, ProviderError> {
        match tile {
            Tile::Grid(grid) => self.fetch_current(grid),
            Tile::Xyz(_) => Err(ProviderError::UnsupportedTile(tile.to_string())),
        }
    }

    fn cache_token(&self, _tile: &Tile, date: NaiveDate) -> String {
        format!("d{}", PackedDate::from_naive_date(date).hex_token())
    }

    fn latest_token(&self) -> String {
        format!("cur{}", self.current.quadtree_version())
    }
}
