//! Retromap CLI - historical satellite imagery exporter.
//!
//! Thin front end over the `retromap` library: argument parsing, console
//! output, and progress display live here; all acquisition logic lives in
//! the library.

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;

use commands::cache::CacheAction;
use commands::dates::DatesArgs;
use commands::export::ExportArgs;

#[derive(Debug, Parser)]
#[command(name = "retromap", version, about = "Export historical satellite imagery as georeferenced rasters")]
struct Cli {
    /// Write a debug-level log file alongside console output
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download a viewport for one date or a date range
    Export(ExportArgs),
    /// List imagery dates available over a viewport
    Dates(DatesArgs),
    /// Tile cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheAction,
        /// Cache directory override
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match &cli.log_file {
        Some(path) => match retromap::logging::init_with_file(path) {
            Ok(guard) => Some(guard),
            Err(e) => {
                eprintln!("{} cannot open log file: {}", style("error:").red(), e);
                return ExitCode::from(2);
            }
        },
        None => {
            retromap::logging::init();
            None
        }
    };

    let result = match cli.command {
        Command::Export(args) => commands::export::run(args),
        Command::Dates(args) => commands::dates::run(args),
        Command::Cache { action, cache_dir } => commands::cache::run(action, cache_dir),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("error:").red(), e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
