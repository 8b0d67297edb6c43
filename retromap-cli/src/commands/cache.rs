//! Cache management CLI commands.

use std::path::PathBuf;

use clap::Subcommand;
use retromap::TileCache;

use super::common::build_config;
use crate::error::CliError;

/// Cache action subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Show tile cache statistics
    Stats,
    /// Clear the tile cache, removing all cached tiles
    Clear,
}

/// Format a byte count for humans.
fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Run a cache subcommand.
pub fn run(action: CacheAction, cache_dir: Option<PathBuf>) -> Result<(), CliError> {
    let config = build_config(cache_dir, None, None);
    let cache =
        TileCache::open(&config.cache_dir).map_err(|e| CliError::Setup(e.to_string()))?;

    match action {
        CacheAction::Stats => {
            let stats = cache.stats().map_err(|e| CliError::Setup(e.to_string()))?;
            println!("Tile cache: {}", config.cache_dir.display());
            println!("  Tiles: {}", stats.entries);
            println!("  Size:  {}", format_size(stats.bytes));
            Ok(())
        }
        CacheAction::Clear => {
            println!("Clearing tile cache at: {}", config.cache_dir.display());
            let cleared = cache.clear().map_err(|e| CliError::Setup(e.to_string()))?;
            println!(
                "Deleted {} tiles, freed {}",
                cleared.entries,
                format_size(cleared.bytes)
            );
            Ok(())
        }
    }
}
