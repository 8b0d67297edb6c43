//! Concurrent download orchestrator
//!
//! Public entry points for acquisition jobs: a bounding box, zoom, and
//! date selector go in; raw tiles and/or a georeferenced raster come out.
//! The orchestrator validates coordinates before any network activity,
//! runs the fixed worker pool of [`worker`], reports progress through the
//! caller's callbacks, and applies the job-level failure rules:
//!
//! - per-tile failures never abort a job, they leave gaps;
//! - a single-date job fails only when not one tile was fetched;
//! - a multi-date batch fails when more than half of its dates failed.

pub mod blank;
pub mod progress;
pub mod worker;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, warn};

use crate::cache::{CacheError, TileCache};
use crate::coord::{BoundingBox, Tile};
use crate::provider::{ProviderError, TileSource};
use crate::stitch::geotiff::{write_geotiff, RasterMetadata};
use crate::stitch::{stitch, StitchError};

pub use progress::{CancelToken, ProgressCallback, ProgressCounters, StatusCallback};
pub use worker::{TileStatus, DEFAULT_WORKERS};

/// Interval between progress callback invocations while a pool runs.
const PROGRESS_POLL: Duration = Duration::from_millis(150);

/// Which imagery date a job asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSelector {
    /// The provider's newest imagery.
    Latest,
    /// Historical imagery captured on a specific date.
    On(NaiveDate),
}

impl DateSelector {
    fn date(&self) -> Option<NaiveDate> {
        match self {
            DateSelector::Latest => None,
            DateSelector::On(d) => Some(*d),
        }
    }
}

/// Desired output artifacts of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Individual tile images only.
    RawTiles,
    /// One stitched, georeferenced raster only.
    Raster,
    /// Both of the above.
    Both,
}

impl OutputFormat {
    fn wants_tiles(&self) -> bool {
        matches!(self, OutputFormat::RawTiles | OutputFormat::Both)
    }

    fn wants_raster(&self) -> bool {
        matches!(self, OutputFormat::Raster | OutputFormat::Both)
    }
}

/// Errors terminating a whole job (per-tile failures are not errors).
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Stitch(#[from] StitchError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Not a single tile of the job could be fetched.
    #[error("job failed: all {total} tiles failed ({context})")]
    JobFailed { total: usize, context: String },

    /// More than half the dates of a batch failed.
    #[error("batch failed: {failed} of {total} dates failed")]
    BatchFailed { failed: usize, total: usize },
}

/// Result of one completed single-date job.
#[derive(Debug)]
pub struct AcquireOutcome {
    /// Stitched raster, when the format asked for one.
    pub raster_path: Option<PathBuf>,
    /// Raw tile files, when the format asked for them.
    pub tile_paths: Vec<PathBuf>,
    pub tiles_total: usize,
    pub tiles_fetched: usize,
}

/// Result of a multi-date batch.
#[derive(Debug)]
pub struct BatchOutcome {
    /// Per-date outcome, in the caller's date order.
    pub per_date: Vec<(DateSelector, Result<AcquireOutcome, DownloadError>)>,
}

impl BatchOutcome {
    pub fn failed_dates(&self) -> usize {
        self.per_date.iter().filter(|(_, r)| r.is_err()).count()
    }
}

/// Orchestrator for acquisition jobs against one tile source.
pub struct Downloader<'a> {
    source: &'a (dyn TileSource + Sync),
    cache: &'a TileCache,
    output_dir: PathBuf,
    workers: usize,
    cancel: CancelToken,
    progress: Option<ProgressCallback>,
    status: Option<StatusCallback>,
}

impl<'a> Downloader<'a> {
    pub fn new(source: &'a (dyn TileSource + Sync), cache: &'a TileCache, output_dir: &Path) -> Self {
        Self {
            source,
            cache,
            output_dir: output_dir.to_path_buf(),
            workers: DEFAULT_WORKERS,
            cancel: CancelToken::new(),
            progress: None,
            status: None,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn with_status(mut self, callback: StatusCallback) -> Self {
        self.status = Some(callback);
        self
    }

    /// Token for cancelling this downloader's jobs from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn report_status(&self, message: &str) {
        if let Some(cb) = &self.status {
            cb(message);
        }
    }

    fn report_progress(
        &self,
        counters: &ProgressCounters,
        status: &str,
        current_date: usize,
        total_dates: usize,
    ) {
        if let Some(cb) = &self.progress {
            cb(
                counters.completed(),
                counters.total(),
                counters.percent(),
                status,
                current_date,
                total_dates,
            );
        }
    }

    /// Acquire one date's imagery over a viewport.
    pub fn acquire(
        &self,
        bbox: &BoundingBox,
        zoom: u8,
        selector: DateSelector,
        format: OutputFormat,
    ) -> Result<AcquireOutcome, DownloadError> {
        self.acquire_inner(bbox, zoom, selector, format, 1, 1)
    }

    fn acquire_inner(
        &self,
        bbox: &BoundingBox,
        zoom: u8,
        selector: DateSelector,
        format: OutputFormat,
        current_date: usize,
        total_dates: usize,
    ) -> Result<AcquireOutcome, DownloadError> {
        // Coordinate validation happens before any network activity.
        let tiles = self.source.tiles_for(bbox, zoom)?;
        let total = tiles.len();
        if total == 0 {
            return Err(DownloadError::JobFailed {
                total: 0,
                context: format!("no tiles cover {} at zoom {}", bbox, zoom),
            });
        }
        let token = match selector.date() {
            Some(d) => self.source.cache_token(&tiles[0], d),
            None => self.source.latest_token(),
        };
        let label = match selector {
            DateSelector::Latest => "latest".to_string(),
            DateSelector::On(d) => d.to_string(),
        };

        self.report_status(&format!(
            "downloading {} tiles from {} for {}",
            total,
            self.source.name(),
            label
        ));

        let counters = Arc::new(ProgressCounters::new(total, self.cancel.flag()));
        let done = Arc::new(AtomicBool::new(false));

        let results = thread::scope(|scope| {
            let reporter = {
                let counters = Arc::clone(&counters);
                let done = Arc::clone(&done);
                let this = &*self;
                let label = label.clone();
                scope.spawn(move || {
                    while !done.load(Ordering::SeqCst) {
                        this.report_progress(&counters, &label, current_date, total_dates);
                        thread::sleep(PROGRESS_POLL);
                    }
                })
            };

            let results = worker::run_pool(
                self.source,
                self.cache,
                &tiles,
                selector.date(),
                self.workers,
                &counters,
            );
            done.store(true, Ordering::SeqCst);
            let _ = reporter.join();
            results
        });

        self.report_progress(&counters, &label, current_date, total_dates);

        let fetched = results.iter().filter(|(_, s)| s.is_fetched()).count();
        info!(
            provider = self.source.name(),
            zoom,
            total,
            fetched,
            failed = counters.failed(),
            date = %label,
            "download job finished"
        );

        if fetched == 0 {
            return Err(DownloadError::JobFailed {
                total,
                context: format!("{} at zoom {} for {}", self.source.name(), zoom, label),
            });
        }

        std::fs::create_dir_all(&self.output_dir)?;

        let mut tile_paths = Vec::new();
        if format.wants_tiles() {
            for (tile, status) in &results {
                let TileStatus::Fetched(bytes) = status else {
                    continue;
                };
                let name = format!(
                    "{}_{}_{}_{}_{}.png",
                    self.source.name(),
                    tile.zoom(),
                    tile.col(),
                    tile.row(),
                    token
                );
                let path = self.output_dir.join(name);
                std::fs::write(&path, bytes)?;
                tile_paths.push(path);
            }
        }

        let mut raster_path = None;
        if format.wants_raster() {
            let payloads: Vec<(Tile, Option<Vec<u8>>)> = results
                .into_iter()
                .map(|(tile, status)| match status {
                    TileStatus::Fetched(bytes) => (tile, Some(bytes)),
                    _ => (tile, None),
                })
                .collect();
            let mosaic = stitch(&payloads)?;

            let path = self
                .output_dir
                .join(format!("{}_{}_z{}.tif", self.source.name(), token, zoom));
            let metadata = RasterMetadata {
                description: format!(
                    "{} imagery, {} of {} tiles, zoom {}",
                    self.source.name(),
                    mosaic.tiles_filled,
                    total,
                    zoom
                ),
                date: selector.date(),
            };
            write_geotiff(&mosaic, &path, &metadata)?;
            raster_path = Some(path);
        }

        self.report_status(&format!("finished {} ({}/{} tiles)", label, fetched, total));
        Ok(AcquireOutcome {
            raster_path,
            tile_paths,
            tiles_total: total,
            tiles_fetched: fetched,
        })
    }

    /// Acquire a batch of dates, one single-date job per entry.
    ///
    /// The batch fails only when more than half of its dates failed; the
    /// per-date outcomes are returned either way inside the error-free
    /// path, so callers can report which dates produced output.
    pub fn acquire_range(
        &self,
        bbox: &BoundingBox,
        zoom: u8,
        selectors: &[DateSelector],
        format: OutputFormat,
    ) -> Result<BatchOutcome, DownloadError> {
        let total_dates = selectors.len();
        let mut per_date = Vec::with_capacity(total_dates);

        for (i, selector) in selectors.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("batch cancelled after {} of {} dates", i, total_dates);
                break;
            }
            let outcome =
                self.acquire_inner(bbox, zoom, *selector, format, i + 1, total_dates);
            if let Err(e) = &outcome {
                warn!(date = ?selector, error = %e, "date failed, continuing batch");
            }
            per_date.push((*selector, outcome));
        }

        let batch = BatchOutcome { per_date };
        let failed = batch.failed_dates() + (total_dates - batch.per_date.len());
        if failed * 2 > total_dates {
            return Err(DownloadError::BatchFailed {
                failed,
                total: total_dates,
            });
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::XyzTile;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn imagery() -> Vec<u8> {
        let img = RgbaImage::from_fn(256, 256, |x, y| {
            Rgba([(x / 2) as u8, (y / 2) as u8, 90, 255])
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    /// Source with a fixed 2x2 tile grid; failures configurable per date.
    struct GridSource {
        /// Dates that fail entirely.
        bad_dates: Vec<NaiveDate>,
        /// Tiles that fail on any date.
        bad_tiles: Vec<(u32, u32)>,
        calls: Mutex<HashMap<String, usize>>,
    }

    impl GridSource {
        fn new() -> Self {
            Self {
                bad_dates: Vec::new(),
                bad_tiles: Vec::new(),
                calls: Mutex::new(HashMap::new()),
            }
        }
    }

    impl TileSource for GridSource {
        fn name(&self) -> &str {
            "grid"
        }

        fn tiles_for(&self, _: &BoundingBox, zoom: u8) -> Result<Vec<Tile>, ProviderError> {
            Ok((0..4)
                .map(|i| Tile::Xyz(XyzTile::new(10 + i % 2, 20 + i / 2, zoom)))
                .collect())
        }

        fn available_dates(
            &self,
            _: &BoundingBox,
            _: u8,
        ) -> Result<Vec<NaiveDate>, ProviderError> {
            Ok(Vec::new())
        }

        fn fetch(&self, tile: &Tile, date: NaiveDate) -> Result<Vec<u8>, ProviderError> {
            *self
                .calls
                .lock()
                .entry(format!("{}@{}", tile, date))
                .or_insert(0) += 1;
            if self.bad_dates.contains(&date) || self.bad_tiles.contains(&(tile.col(), tile.row()))
            {
                return Err(ProviderError::Http("synthetic failure".to_string()));
            }
            Ok(imagery())
        }

        fn fetch_latest(&self, tile: &Tile) -> Result<Vec<u8>, ProviderError> {
            self.fetch(tile, NaiveDate::from_ymd_opt(2030, 1, 1).unwrap())
        }

        fn cache_token(&self, _: &Tile, date: NaiveDate) -> String {
            format!("d{}", date.format("%Y%m%d"))
        }

        fn latest_token(&self) -> String {
            "latest".to_string()
        }
    }

    fn bbox() -> BoundingBox {
        BoundingBox::new(40.0, -74.0, 41.0, -73.0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_acquire_produces_raster_and_tiles() {
        let cache_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let cache = TileCache::open(cache_dir.path()).unwrap();
        let source = GridSource::new();
        let downloader = Downloader::new(&source, &cache, out_dir.path()).with_workers(2);

        let outcome = downloader
            .acquire(
                &bbox(),
                12,
                DateSelector::On(date(2020, 6, 1)),
                OutputFormat::Both,
            )
            .unwrap();

        assert_eq!(outcome.tiles_total, 4);
        assert_eq!(outcome.tiles_fetched, 4);
        assert_eq!(outcome.tile_paths.len(), 4);
        let raster = outcome.raster_path.unwrap();
        assert!(raster.exists());

        let decoded = image::open(&raster).unwrap();
        assert_eq!(decoded.width(), 512);
        assert_eq!(decoded.height(), 512);
    }

    #[test]
    fn test_partial_failure_leaves_gaps_but_completes() {
        let cache_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let cache = TileCache::open(cache_dir.path()).unwrap();
        let mut source = GridSource::new();
        source.bad_tiles.push((11, 21));
        let downloader = Downloader::new(&source, &cache, out_dir.path());

        let outcome = downloader
            .acquire(
                &bbox(),
                12,
                DateSelector::On(date(2020, 6, 1)),
                OutputFormat::Raster,
            )
            .unwrap();

        assert_eq!(outcome.tiles_fetched, 3);
        let decoded = image::open(outcome.raster_path.unwrap())
            .unwrap()
            .to_rgba8();
        // Tile (11, 21) is the SE quadrant; its region stays transparent.
        assert_eq!(decoded.get_pixel(300, 300).0[3], 0);
        assert_ne!(decoded.get_pixel(100, 100).0[3], 0);
    }

    #[test]
    fn test_total_failure_is_a_job_error() {
        let cache_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let cache = TileCache::open(cache_dir.path()).unwrap();
        let mut source = GridSource::new();
        let d = date(2020, 6, 1);
        source.bad_dates.push(d);
        let downloader = Downloader::new(&source, &cache, out_dir.path());

        let result = downloader.acquire(&bbox(), 12, DateSelector::On(d), OutputFormat::Raster);
        assert!(matches!(result, Err(DownloadError::JobFailed { total: 4, .. })));
    }

    #[test]
    fn test_batch_fails_past_half() {
        let cache_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let cache = TileCache::open(cache_dir.path()).unwrap();
        let mut source = GridSource::new();
        for m in [1, 2, 3] {
            source.bad_dates.push(date(2020, m, 1));
        }
        let downloader = Downloader::new(&source, &cache, out_dir.path());

        let selectors: Vec<DateSelector> = (1..=4)
            .map(|m| DateSelector::On(date(2020, m, 1)))
            .collect();
        let result = downloader.acquire_range(&bbox(), 12, &selectors, OutputFormat::Raster);
        assert!(matches!(
            result,
            Err(DownloadError::BatchFailed { failed: 3, total: 4 })
        ));
    }

    #[test]
    fn test_batch_tolerates_minority_failure() {
        let cache_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let cache = TileCache::open(cache_dir.path()).unwrap();
        let mut source = GridSource::new();
        source.bad_dates.push(date(2020, 1, 1));
        let downloader = Downloader::new(&source, &cache, out_dir.path());

        let selectors: Vec<DateSelector> = (1..=4)
            .map(|m| DateSelector::On(date(2020, m, 1)))
            .collect();
        let batch = downloader
            .acquire_range(&bbox(), 12, &selectors, OutputFormat::Raster)
            .unwrap();

        assert_eq!(batch.failed_dates(), 1);
        assert_eq!(batch.per_date.len(), 4);
        assert!(batch.per_date[0].1.is_err());
        assert!(batch.per_date[1].1.is_ok());
    }

    #[test]
    fn test_progress_reaches_completion() {
        let cache_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let cache = TileCache::open(cache_dir.path()).unwrap();
        let source = GridSource::new();

        let seen: Arc<Mutex<Vec<(usize, usize, usize, usize)>>> =
            Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let downloader = Downloader::new(&source, &cache, out_dir.path()).with_progress(
            Box::new(move |done, total, _pct, _status, cur, dates| {
                sink.lock().push((done, total, cur, dates));
            }),
        );

        downloader
            .acquire(
                &bbox(),
                12,
                DateSelector::On(date(2020, 6, 1)),
                OutputFormat::RawTiles,
            )
            .unwrap();

        let seen = seen.lock();
        let last = seen.last().unwrap();
        assert_eq!(last, &(4, 4, 1, 1));
    }

    #[test]
    fn test_latest_selector_uses_latest_fetch_path() {
        let cache_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let cache = TileCache::open(cache_dir.path()).unwrap();
        let source = GridSource::new();
        let downloader = Downloader::new(&source, &cache, out_dir.path());

        let outcome = downloader
            .acquire(&bbox(), 12, DateSelector::Latest, OutputFormat::RawTiles)
            .unwrap();

        assert_eq!(outcome.tiles_fetched, 4);
        assert!(outcome.tile_paths[0]
            .file_name()
            .unwrap()
            .to_string_lossy()
            .contains("latest"));
    }
}
