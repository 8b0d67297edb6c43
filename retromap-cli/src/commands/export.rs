//! Export command: download a viewport and write tiles and/or a raster.

use std::path::PathBuf;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use retromap::{app, DateSelector, Downloader, TileSource};
use tracing::debug;

use super::common::{build_config, parse_bbox, parse_date, FormatArg, ProviderArg};
use crate::error::CliError;

/// Arguments for the export command.
#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Viewport as south,west,north,east in WGS84 degrees
    #[arg(long)]
    pub bbox: String,

    /// Tile zoom level
    #[arg(long)]
    pub zoom: u8,

    /// Imagery date (YYYY-MM-DD); omit for the latest imagery
    #[arg(long, conflicts_with_all = ["from", "to"])]
    pub date: Option<String>,

    /// Start of a date range (YYYY-MM-DD), paired with --to
    #[arg(long, requires = "to")]
    pub from: Option<String>,

    /// End of a date range (YYYY-MM-DD), paired with --from
    #[arg(long, requires = "from")]
    pub to: Option<String>,

    /// Imagery provider
    #[arg(long, value_enum, default_value = "earth")]
    pub provider: ProviderArg,

    /// Output artifacts
    #[arg(long, value_enum, default_value = "raster")]
    pub format: FormatArg,

    /// Output directory (default: the system download directory)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Cache directory override
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Download worker count
    #[arg(long)]
    pub workers: Option<usize>,
}

pub fn run(args: ExportArgs) -> Result<(), CliError> {
    let bbox = parse_bbox(&args.bbox)?;
    let config = build_config(args.cache_dir, args.output, args.workers);

    let kind = retromap::ProviderKind::from(args.provider);
    println!("Connecting to {} ...", style(kind.name()).cyan());
    let provider = app::Provider::connect(kind, &config)?;
    let cache = app::open_cache(&config)?;

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "{bar:40.cyan/blue} {pos}/{len} tiles  {msg}",
        )
        .map_err(|e| CliError::Setup(e.to_string()))?,
    );
    let progress_bar = bar.clone();
    let downloader = Downloader::new(provider.as_source(), &cache, &config.download_dir)
        .with_workers(config.workers)
        .with_progress(Box::new(move |done, total, _pct, status, cur, dates| {
            progress_bar.set_length(total as u64);
            progress_bar.set_position(done as u64);
            if dates > 1 {
                progress_bar.set_message(format!("{} (date {}/{})", status, cur, dates));
            } else {
                progress_bar.set_message(status.to_string());
            }
        }));

    if let (Some(from), Some(to)) = (&args.from, &args.to) {
        let from = parse_date(from)?;
        let to = parse_date(to)?;
        if from > to {
            return Err(CliError::Usage(format!(
                "--from {} is after --to {}",
                from, to
            )));
        }

        println!("Discovering imagery dates over the viewport ...");
        let available = provider
            .as_source()
            .available_dates(&bbox, args.zoom)
            .map_err(|e| CliError::Job(e.to_string()))?;
        let selectors: Vec<DateSelector> = available
            .into_iter()
            .filter(|d| *d >= from && *d <= to)
            .map(DateSelector::On)
            .collect();
        if selectors.is_empty() {
            return Err(CliError::Job(format!(
                "no imagery dates between {} and {} over this viewport",
                from, to
            )));
        }
        debug!(dates = selectors.len(), "date range resolved");
        println!("{} imagery dates in range", selectors.len());

        let batch = downloader.acquire_range(&bbox, args.zoom, &selectors, args.format.into())?;
        bar.finish_and_clear();

        for (selector, outcome) in &batch.per_date {
            let label = match selector {
                DateSelector::On(d) => d.to_string(),
                DateSelector::Latest => "latest".to_string(),
            };
            match outcome {
                Ok(o) => println!(
                    "  {} {}  {}/{} tiles{}",
                    style("ok").green(),
                    label,
                    o.tiles_fetched,
                    o.tiles_total,
                    o.raster_path
                        .as_ref()
                        .map(|p| format!("  -> {}", p.display()))
                        .unwrap_or_default()
                ),
                Err(e) => println!("  {} {}  {}", style("failed").red(), label, e),
            }
        }
    } else {
        let selector = match &args.date {
            Some(s) => DateSelector::On(parse_date(s)?),
            None => DateSelector::Latest,
        };
        let outcome = downloader.acquire(&bbox, args.zoom, selector, args.format.into())?;
        bar.finish_and_clear();

        println!(
            "{} {}/{} tiles",
            style("Done:").green(),
            outcome.tiles_fetched,
            outcome.tiles_total
        );
        if let Some(path) = &outcome.raster_path {
            println!("Raster: {}", path.display());
        }
        if !outcome.tile_paths.is_empty() {
            println!("Tiles:  {} files in {}", outcome.tile_paths.len(), config.download_dir.display());
        }
    }
    Ok(())
}
