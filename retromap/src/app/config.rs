//! Application configuration.
//!
//! `AppConfig` combines everything the acquisition core needs at startup:
//! cache and output locations, worker pool size, network timeout, and the
//! default output shape. Providers and the downloader read from it; it
//! carries no runtime state.

use std::path::PathBuf;

use crate::download::OutputFormat;
use crate::provider::earth::KNOWN_GOOD_EPOCHS;
use crate::provider::DEFAULT_TIMEOUT_SECS;

/// Default number of download workers.
pub const DEFAULT_WORKER_COUNT: usize = 10;

/// Top-level configuration for the acquisition core.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Root directory of the tile cache.
    pub cache_dir: PathBuf,

    /// Directory where output artifacts are written.
    pub download_dir: PathBuf,

    /// Worker pool size for download jobs.
    pub workers: usize,

    /// Per-request HTTP timeout in seconds.
    pub timeout_secs: u64,

    /// Output shape used when the caller does not specify one.
    pub default_format: OutputFormat,

    /// Last-resort epoch list for the quadtree provider.
    pub known_good_epochs: Vec<u32>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("retromap");
        let download_dir = dirs::download_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            cache_dir,
            download_dir,
            workers: DEFAULT_WORKER_COUNT,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            default_format: OutputFormat::Raster,
            known_good_epochs: KNOWN_GOOD_EPOCHS.to_vec(),
        }
    }
}

impl AppConfig {
    /// Set the cache root directory.
    pub fn with_cache_dir(mut self, dir: PathBuf) -> Self {
        self.cache_dir = dir;
        self
    }

    /// Set the output directory.
    pub fn with_download_dir(mut self, dir: PathBuf) -> Self {
        self.download_dir = dir;
        self
    }

    /// Set the worker pool size (minimum 1).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the per-request HTTP timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Override the known-good epoch list.
    pub fn with_known_good_epochs(mut self, epochs: Vec<u32>) -> Self {
        self.known_good_epochs = epochs;
        self
    }
}
