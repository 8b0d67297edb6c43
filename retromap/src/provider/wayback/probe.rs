//! Per-tile change probing and capture-date lookup.
//!
//! The archive exposes a lightweight probe answering "does release R hold
//! its own imagery for this tile, and if not under which release did the
//! tile last change?". The probe's `select` hint is what keeps the
//! backward walk over ~100 releases proportional to the number of real
//! local changes.
//!
//! The capture date of a release at a point comes from a separate
//! metadata query; the nominal release date in the layer title is NOT the
//! date the imagery was taken.

use chrono::NaiveDate;
use serde::Deserialize;

use crate::provider::{HttpClient, ProviderError};

/// Probe answer for one (release, tile) pair.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeProbe {
    /// `[1]` when the release carries its own imagery for the tile,
    /// `[0]` when it reuses an older release's tile.
    #[serde(default)]
    pub data: Vec<u8>,
    /// Optional hint: the release identifier under which this tile's
    /// imagery actually lives. Present when `data` is `[0]`.
    #[serde(default)]
    pub select: Vec<u32>,
}

impl ChangeProbe {
    /// The release holds its own imagery for the probed tile.
    pub fn has_change(&self) -> bool {
        self.data.first() == Some(&1)
    }

    /// The release the probe redirects to, if any.
    pub fn redirect(&self) -> Option<u32> {
        self.select.first().copied()
    }
}

/// Query the change probe for a tile under one release.
pub fn probe_tile(
    http: &dyn HttpClient,
    probe_base: &str,
    release_id: u32,
    zoom: u8,
    row: u32,
    col: u32,
) -> Result<ChangeProbe, ProviderError> {
    let url = format!("{}/tilemap/{}/{}/{}/{}", probe_base, release_id, zoom, row, col);
    let body = http.get(&url)?;
    serde_json::from_slice(&body)
        .map_err(|e| ProviderError::Decode(format!("change probe response: {}", e)))
}

#[derive(Debug, Deserialize)]
struct MetadataResponse {
    #[serde(default)]
    features: Vec<MetadataFeature>,
}

#[derive(Debug, Deserialize)]
struct MetadataFeature {
    attributes: MetadataAttributes,
}

#[derive(Debug, Deserialize)]
struct MetadataAttributes {
    /// Capture date of the imagery at the queried point, ISO formatted.
    #[serde(rename = "SRC_DATE2")]
    src_date: Option<String>,
}

/// True capture date of a release's imagery at a WGS84 point.
///
/// Returns `None` when the metadata service has no record for the point;
/// callers fall back to the release's nominal date in that case.
pub fn capture_date_at(
    http: &dyn HttpClient,
    metadata_base: &str,
    release_id: u32,
    lat: f64,
    lon: f64,
) -> Result<Option<NaiveDate>, ProviderError> {
    let url = format!(
        "{}/{}/query?f=json&returnGeometry=false&geometry={},{}",
        metadata_base, release_id, lon, lat
    );
    let body = http.get(&url)?;
    let response: MetadataResponse = serde_json::from_slice(&body)
        .map_err(|e| ProviderError::Decode(format!("point metadata response: {}", e)))?;

    let Some(raw) = response
        .features
        .first()
        .and_then(|f| f.attributes.src_date.as_deref())
    else {
        return Ok(None);
    };

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(Some)
        .map_err(|e| ProviderError::Decode(format!("capture date {:?}: {}", raw, e)))
}
