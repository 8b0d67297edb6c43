//! Retromap - historical satellite imagery acquisition
//!
//! This library fetches dated satellite imagery tiles from two
//! reverse-engineered remote services - an encrypted quadtree tile
//! service and a WMTS historical tile archive - and reassembles them into
//! georeferenced rasters.
//!
//! The pieces, in dependency order:
//!
//! - [`coord`] - WGS84 / Web Mercator / quadtree-grid conversions;
//! - [`provider`] - the two protocol clients behind one
//!   [`TileSource`](provider::TileSource) seam;
//! - [`cache`] - the on-disk tile payload store;
//! - [`download`] - the bounded worker pool, blank-tile rejection, and
//!   job-level failure rules;
//! - [`stitch`] - mosaic assembly and GeoTIFF georeferencing;
//! - [`app`] - configuration and provider wiring for front ends.

pub mod app;
pub mod cache;
pub mod coord;
pub mod download;
pub mod logging;
pub mod provider;
pub mod stitch;

pub use app::{AppConfig, AppError, Provider, ProviderKind};
pub use cache::{CacheError, TileCache};
pub use coord::BoundingBox;
pub use download::{
    AcquireOutcome, BatchOutcome, CancelToken, DateSelector, DownloadError, Downloader,
    OutputFormat,
};
pub use provider::{ProviderError, TileSource};
