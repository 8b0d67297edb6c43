//! Provider error taxonomy.
//!
//! Mirrors the error handling design of the acquisition core:
//!
//! - transient fetch failures are retried only through the epoch/zoom
//!   fallback layers, then recorded and skipped by the orchestrator;
//! - decode failures (cipher, compression, metadata, XML, JSON) are hard
//!   errors for the affected tile and never retried;
//! - validation failures are rejected before any network activity.

use thiserror::Error;

use crate::coord::CoordError;

/// Errors produced by the protocol clients.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Network or HTTP-level failure. Transient; subject to fallback.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The provider answered but the payload could not be decoded.
    /// Non-retryable for the affected tile.
    #[error("protocol decode error: {0}")]
    Decode(String),

    /// Requested zoom outside the provider's supported range.
    #[error("unsupported zoom level: {0}")]
    UnsupportedZoom(u8),

    /// No imagery exists for the requested date on this tile, even after
    /// exhausting every fallback layer.
    #[error("no imagery for {date} at {context}")]
    NoImagery { date: String, context: String },

    /// A tile of the wrong coordinate family was passed to a client.
    #[error("unsupported tile for this provider: {0}")]
    UnsupportedTile(String),

    /// Coordinate validation failed before any network activity.
    #[error(transparent)]
    Coord(#[from] CoordError),
}

impl ProviderError {
    /// Whether the orchestrator may keep trying fallback candidates after
    /// this error. Decode failures poison the tile; HTTP failures do not.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Http(_) | ProviderError::NoImagery { .. })
    }
}
