//! Dates command: list imagery dates available over a viewport.

use std::path::PathBuf;

use clap::Args;
use console::style;
use retromap::{app, TileSource};

use super::common::{build_config, parse_bbox, ProviderArg};
use crate::error::CliError;

/// Arguments for the dates command.
#[derive(Debug, Args)]
pub struct DatesArgs {
    /// Viewport as south,west,north,east in WGS84 degrees
    #[arg(long)]
    pub bbox: String,

    /// Tile zoom level the imagery would be fetched at
    #[arg(long)]
    pub zoom: u8,

    /// Imagery provider
    #[arg(long, value_enum, default_value = "earth")]
    pub provider: ProviderArg,

    /// Cache directory override
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
}

pub fn run(args: DatesArgs) -> Result<(), CliError> {
    let bbox = parse_bbox(&args.bbox)?;
    let config = build_config(args.cache_dir, None, None);
    let kind = retromap::ProviderKind::from(args.provider);

    println!("Connecting to {} ...", style(kind.name()).cyan());
    let provider = app::Provider::connect(kind, &config)?;

    let dates = provider
        .as_source()
        .available_dates(&bbox, args.zoom)
        .map_err(|e| CliError::Job(e.to_string()))?;

    if dates.is_empty() {
        println!("No imagery dates found over this viewport.");
        return Ok(());
    }

    println!(
        "{} imagery dates over {} (newest first):",
        dates.len(),
        bbox
    );
    for date in dates {
        println!("  {}", date);
    }
    Ok(())
}
