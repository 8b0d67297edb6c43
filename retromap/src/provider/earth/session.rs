//! Per-flavor session state for the quadtree service.
//!
//! The service runs two databases: current imagery and the historical
//! ("time machine") archive. Each has its own keystream key and quadtree
//! version, discovered from its own root descriptor. A session is an
//! explicitly constructed value passed to whoever needs it; there is no
//! ambient global key material, so the two flavors cannot cross-contaminate.

use tracing::debug;

use crate::provider::{HttpClient, ProviderError};

use super::crypto;
use super::dbroot::parse_root_descriptor;

/// Which of the provider's two databases a session talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// Latest imagery only.
    Current,
    /// The historical archive carrying dated imagery.
    Historical,
}

impl Flavor {
    /// Query-string fragment selecting the database, if any.
    pub fn db_query(&self) -> &'static str {
        match self {
            Flavor::Current => "",
            Flavor::Historical => "db=tm&",
        }
    }
}

/// An established session: key material plus quadtree version.
#[derive(Debug, Clone)]
pub struct EarthSession {
    flavor: Flavor,
    key: Vec<u8>,
    quadtree_version: u32,
}

impl EarthSession {
    /// Fetch and decode the flavor's root descriptor.
    pub fn establish(
        http: &dyn HttpClient,
        base_url: &str,
        flavor: Flavor,
    ) -> Result<Self, ProviderError> {
        let url = format!("{}/dbRoot.v5?{}hl=en&gl=us", base_url, flavor.db_query());
        let raw = http.get(&url)?;
        let descriptor = parse_root_descriptor(&raw)?;
        debug!(
            ?flavor,
            quadtree_version = descriptor.quadtree_version,
            key_len = descriptor.key.len(),
            "established quadtree session"
        );
        Ok(Self {
            flavor,
            key: descriptor.key,
            quadtree_version: descriptor.quadtree_version,
        })
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    pub fn quadtree_version(&self) -> u32 {
        self.quadtree_version
    }

    /// Strip the cipher and compression envelope from a packet fetched
    /// under this session.
    pub fn open_packet(&self, wire: &[u8]) -> Result<Vec<u8>, ProviderError> {
        let mut data = wire.to_vec();
        crypto::apply_keystream(&self.key, &mut data)?;
        crypto::decompress(&data)
    }
}
