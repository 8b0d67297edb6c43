//! Common types and utilities shared across CLI commands.

use chrono::NaiveDate;
use clap::ValueEnum;
use retromap::{AppConfig, BoundingBox, OutputFormat, ProviderKind};

use crate::error::CliError;

/// Imagery provider selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum ProviderArg {
    /// Encrypted quadtree imagery service (deep historical coverage)
    Earth,
    /// WMTS tile archive (release-based coverage since 2014)
    Wayback,
}

impl From<ProviderArg> for ProviderKind {
    fn from(p: ProviderArg) -> Self {
        match p {
            ProviderArg::Earth => ProviderKind::Earth,
            ProviderArg::Wayback => ProviderKind::Wayback,
        }
    }
}

/// Output shape selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    /// Individual tile images only
    Tiles,
    /// One stitched, georeferenced raster
    Raster,
    /// Both tiles and raster
    Both,
}

impl From<FormatArg> for OutputFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Tiles => OutputFormat::RawTiles,
            FormatArg::Raster => OutputFormat::Raster,
            FormatArg::Both => OutputFormat::Both,
        }
    }
}

/// Parse a `south,west,north,east` viewport argument.
pub fn parse_bbox(s: &str) -> Result<BoundingBox, CliError> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(CliError::Usage(format!(
            "bounding box must be south,west,north,east (got {:?})",
            s
        )));
    }
    let mut values = [0.0f64; 4];
    for (i, part) in parts.iter().enumerate() {
        values[i] = part
            .parse()
            .map_err(|_| CliError::Usage(format!("not a number in bounding box: {:?}", part)))?;
    }
    BoundingBox::new(values[0], values[1], values[2], values[3])
        .map_err(|e| CliError::Usage(e.to_string()))
}

/// Parse a `YYYY-MM-DD` date argument.
pub fn parse_date(s: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| CliError::Usage(format!("date must be YYYY-MM-DD (got {:?})", s)))
}

/// Build the application config from global CLI options.
pub fn build_config(
    cache_dir: Option<std::path::PathBuf>,
    output_dir: Option<std::path::PathBuf>,
    workers: Option<usize>,
) -> AppConfig {
    let mut config = AppConfig::default();
    if let Some(dir) = cache_dir {
        config = config.with_cache_dir(dir);
    }
    if let Some(dir) = output_dir {
        config = config.with_download_dir(dir);
    }
    if let Some(n) = workers {
        config = config.with_workers(n);
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bbox_valid() {
        let bbox = parse_bbox("40.5, -74.1, 40.9, -73.7").unwrap();
        assert_eq!(bbox.south, 40.5);
        assert_eq!(bbox.east, -73.7);
    }

    #[test]
    fn test_parse_bbox_rejects_malformed() {
        assert!(parse_bbox("1,2,3").is_err());
        assert!(parse_bbox("a,b,c,d").is_err());
        // South above north is a validation error, not a parse error.
        assert!(parse_bbox("50,0,40,10").is_err());
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2020-06-01").unwrap(),
            NaiveDate::from_ymd_opt(2020, 6, 1).unwrap()
        );
        assert!(parse_date("06/01/2020").is_err());
    }
}
