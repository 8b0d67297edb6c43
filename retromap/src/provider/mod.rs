//! Historical imagery provider clients
//!
//! Two reverse-engineered remote tile services, structurally parallel and
//! sharing no state:
//!
//! - [`earth`] - the encrypted quadtree imagery service (current and
//!   historical flavors, each behind its own [`earth::EarthSession`]);
//! - [`wayback`] - the WMTS tile archive with per-tile change probing.
//!
//! Both implement [`TileSource`], the seam consumed by the download
//! orchestrator. HTTP access goes through the [`HttpClient`] trait so every
//! protocol path is testable against canned responses.

pub mod earth;
pub mod wayback;

mod http;
mod source;
mod types;

pub use http::{HttpClient, ReqwestClient, DEFAULT_TIMEOUT_SECS};
pub use source::TileSource;
pub use types::ProviderError;

#[cfg(test)]
pub use http::tests::MockHttpClient;
