//! WMTS tile-archive client
//!
//! The archive publishes one WMTS layer per historical release. Most
//! releases reuse tiles from older releases, so "which dates changed
//! HERE" is answered per tile by walking backward from the newest release
//! with the change probe, following its redirect hints rather than
//! stepping release by release (see [`probe`]).
//!
//! Deduplication is by true capture date: several releases can republish
//! imagery taken on the same day, and only the newest release per capture
//! date is kept.

mod capabilities;
mod probe;

pub use capabilities::WaybackLayer;
pub use probe::ChangeProbe;

use std::collections::HashMap;

use chrono::NaiveDate;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::coord::{xyz_tile_to_lat_lon, xyz_tiles_in, BoundingBox, Tile, XyzTile};
use crate::provider::{HttpClient, ProviderError, TileSource};

/// Default capabilities document for the archive.
pub const CAPABILITIES_URL: &str =
    "https://wayback.maptiles.arcgis.com/arcgis/rest/services/world_imagery/wmts/1.0.0/WMTSCapabilities.xml";

/// Default base for the per-tile change probe.
pub const PROBE_BASE_URL: &str =
    "https://wayback.maptiles.arcgis.com/arcgis/rest/services/world_imagery/mapserver";

/// Default base for the point-metadata capture-date service.
pub const METADATA_BASE_URL: &str =
    "https://metadata.maptiles.arcgis.com/arcgis/rest/services/world_imagery_metadata/mapserver";

/// One local change found by the backward walk: the release to fetch from
/// and the date the imagery was actually captured.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalChange {
    pub release_id: u32,
    pub capture_date: NaiveDate,
}

/// Client for the WMTS historical tile archive.
pub struct WaybackClient<C: HttpClient> {
    http: C,
    /// All releases from the capabilities document, newest first.
    layers: Vec<WaybackLayer>,
    probe_base: String,
    metadata_base: String,
    /// Completed backward walks; the archive is immutable within a
    /// session, so a tile's change list never goes stale.
    changes: Mutex<HashMap<XyzTile, Vec<LocalChange>>>,
}

impl<C: HttpClient> WaybackClient<C> {
    /// Connect to the default archive endpoints.
    pub fn connect(http: C) -> Result<Self, ProviderError> {
        Self::connect_to(http, CAPABILITIES_URL, PROBE_BASE_URL, METADATA_BASE_URL)
    }

    /// Connect to explicit endpoints (used by tests and mirrors).
    pub fn connect_to(
        http: C,
        capabilities_url: &str,
        probe_base: &str,
        metadata_base: &str,
    ) -> Result<Self, ProviderError> {
        let body = http.get(capabilities_url)?;
        let xml = String::from_utf8(body)
            .map_err(|e| ProviderError::Decode(format!("capabilities not UTF-8: {}", e)))?;
        let layers = capabilities::parse_capabilities(&xml)?;
        debug!(releases = layers.len(), "archive capabilities loaded");
        Ok(Self {
            http,
            layers,
            probe_base: probe_base.to_string(),
            metadata_base: metadata_base.to_string(),
            changes: Mutex::new(HashMap::new()),
        })
    }

    /// All releases, newest first.
    pub fn layers(&self) -> &[WaybackLayer] {
        &self.layers
    }

    fn layer_index(&self, release_id: u32) -> Option<usize> {
        self.layers.iter().position(|l| l.id == release_id)
    }

    fn layer(&self, release_id: u32) -> Result<&WaybackLayer, ProviderError> {
        self.layers
            .iter()
            .find(|l| l.id == release_id)
            .ok_or_else(|| {
                ProviderError::Decode(format!("unknown release identifier {}", release_id))
            })
    }

    /// Capture date of a release over a tile, falling back to the nominal
    /// release date when the metadata service has no record.
    fn capture_date(&self, release: &WaybackLayer, tile: &XyzTile) -> NaiveDate {
        let (north, west) = xyz_tile_to_lat_lon(tile);
        let (south, east) =
            xyz_tile_to_lat_lon(&XyzTile::new(tile.col + 1, tile.row + 1, tile.zoom));
        let lat = (north + south) / 2.0;
        let lon = (west + east) / 2.0;

        match probe::capture_date_at(&self.http, &self.metadata_base, release.id, lat, lon) {
            Ok(Some(date)) => date,
            Ok(None) => release.release_date,
            Err(e) => {
                warn!(release = release.id, error = %e, "capture-date lookup failed, using release date");
                release.release_date
            }
        }
    }

    /// Releases with distinct local imagery for a tile, newest first.
    ///
    /// Walks backward from the newest release. A positive probe yields a
    /// candidate; a redirect hint on either polarity jumps straight to
    /// the release where the next distinct change lives. The walk only
    /// ever moves toward older releases, so it terminates regardless of
    /// what the probe answers.
    ///
    /// Walks are cached per tile, so date discovery followed by a fetch
    /// over the same viewport probes each tile once.
    pub fn local_changes(&self, tile: &XyzTile) -> Result<Vec<LocalChange>, ProviderError> {
        if let Some(cached) = self.changes.lock().get(tile) {
            return Ok(cached.clone());
        }
        let found = self.walk_changes(tile)?;
        self.changes.lock().insert(*tile, found.clone());
        Ok(found)
    }

    fn walk_changes(&self, tile: &XyzTile) -> Result<Vec<LocalChange>, ProviderError> {
        let mut changes: Vec<LocalChange> = Vec::new();
        let mut index = 0usize;

        while index < self.layers.len() {
            let release = &self.layers[index];
            let p = probe::probe_tile(
                &self.http,
                &self.probe_base,
                release.id,
                tile.zoom,
                tile.row,
                tile.col,
            )?;

            if p.has_change() {
                let capture_date = self.capture_date(release, tile);
                if !changes.iter().any(|c| c.capture_date == capture_date) {
                    changes.push(LocalChange {
                        release_id: release.id,
                        capture_date,
                    });
                }
                // A positive probe may name the release holding the next
                // distinct change; take the shortcut when it points
                // strictly backward, otherwise step one release.
                index = match p.redirect().and_then(|t| self.layer_index(t)) {
                    Some(t) if t > index => t,
                    _ => index + 1,
                };
            } else if let Some(target) = p.redirect() {
                match self.layer_index(target) {
                    // Only follow hints pointing at strictly older releases.
                    Some(t) if t > index => index = t,
                    _ => {
                        warn!(
                            from = release.id,
                            to = target,
                            "probe redirect does not point backward, stopping walk"
                        );
                        break;
                    }
                }
            } else {
                // No local imagery at this release and nothing older.
                break;
            }
        }

        debug!(tile = %tile, changes = changes.len(), "backward walk complete");
        Ok(changes)
    }

    /// Fetch a tile from a specific release.
    pub fn fetch_release(&self, tile: &XyzTile, release_id: u32) -> Result<Vec<u8>, ProviderError> {
        let layer = self.layer(release_id)?;
        self.http
            .get(&layer.tile_url(tile.zoom, tile.row, tile.col))
    }
}

impl<C: HttpClient> TileSource for WaybackClient<C> {
    fn name(&self) -> &str {
        "wayback"
    }

    fn tiles_for(&self, bbox: &BoundingBox, zoom: u8) -> Result<Vec<Tile>, ProviderError> {
        Ok(xyz_tiles_in(bbox, zoom)?.into_iter().map(Tile::Xyz).collect())
    }

    fn available_dates(
        &self,
        bbox: &BoundingBox,
        zoom: u8,
    ) -> Result<Vec<NaiveDate>, ProviderError> {
        let (lat, lon) = bbox.center();
        let tile = crate::coord::to_xyz_tile(lat, lon, zoom)?;
        let changes = self.local_changes(&tile)?;
        Ok(changes.into_iter().map(|c| c.capture_date).collect())
    }

    fn fetch(&self, tile: &Tile, date: NaiveDate) -> Result<Vec<u8>, ProviderError> {
        let Tile::Xyz(xyz) = tile else {
            return Err(ProviderError::UnsupportedTile(tile.to_string()));
        };
        let changes = self.local_changes(xyz)?;
        let Some(change) = changes.iter().find(|c| c.capture_date == date) else {
            return Err(ProviderError::NoImagery {
                date: date.to_string(),
                context: xyz.to_string(),
            });
        };
        self.fetch_release(xyz, change.release_id)
    }

    fn fetch_latest(&self, tile: &Tile) -> Result<Vec<u8>, ProviderError> {
        let Tile::Xyz(xyz) = tile else {
            return Err(ProviderError::UnsupportedTile(tile.to_string()));
        };
        self.fetch_release(xyz, self.layers[0].id)
    }

    fn cache_token(&self, _tile: &Tile, date: NaiveDate) -> String {
        format!("w{}", date.format("%Y%m%d"))
    }

    fn latest_token(&self) -> String {
        format!("r{}", self.layers[0].id)
    }
}
