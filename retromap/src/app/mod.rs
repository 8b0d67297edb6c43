//! Application assembly.
//!
//! Wires the configured providers, cache, and downloader together for
//! consumers that want the whole acquisition core behind one constructor
//! (the CLI, a job queue). Pure plumbing; each component stays usable on
//! its own.

mod config;
mod error;

pub use config::{AppConfig, DEFAULT_WORKER_COUNT};
pub use error::AppError;

use crate::cache::TileCache;
use crate::provider::earth::EarthClient;
use crate::provider::wayback::WaybackClient;
use crate::provider::ReqwestClient;

/// Which remote provider a job talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// The encrypted quadtree imagery service.
    Earth,
    /// The WMTS tile archive.
    Wayback,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::Earth => "earth",
            ProviderKind::Wayback => "wayback",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "earth" => Ok(ProviderKind::Earth),
            "wayback" => Ok(ProviderKind::Wayback),
            other => Err(AppError::Config(format!("unknown provider {:?}", other))),
        }
    }
}

/// A connected provider client, behind the common tile-source seam.
pub enum Provider {
    Earth(EarthClient<ReqwestClient>),
    Wayback(WaybackClient<ReqwestClient>),
}

impl Provider {
    /// Establish sessions with the chosen provider.
    pub fn connect(kind: ProviderKind, config: &AppConfig) -> Result<Self, AppError> {
        let http = ReqwestClient::with_timeout(config.timeout_secs)?;
        match kind {
            ProviderKind::Earth => {
                let client = EarthClient::connect(http)?
                    .with_known_good_epochs(config.known_good_epochs.clone());
                Ok(Provider::Earth(client))
            }
            ProviderKind::Wayback => Ok(Provider::Wayback(WaybackClient::connect(http)?)),
        }
    }

    pub fn as_source(&self) -> &(dyn crate::provider::TileSource + Sync) {
        match self {
            Provider::Earth(c) => c,
            Provider::Wayback(c) => c,
        }
    }
}

/// Open the tile cache at the configured location.
pub fn open_cache(config: &AppConfig) -> Result<TileCache, AppError> {
    Ok(TileCache::open(&config.cache_dir)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parses() {
        assert_eq!("earth".parse::<ProviderKind>().unwrap(), ProviderKind::Earth);
        assert_eq!(
            "wayback".parse::<ProviderKind>().unwrap(),
            ProviderKind::Wayback
        );
        assert!("bing".parse::<ProviderKind>().is_err());
    }
}
