//! Fixed-size worker pool for tile fetching.
//!
//! Workers pull tile coordinates from one shared work list and run the
//! per-tile pipeline: cache lookup, provider fetch with its fallback
//! layers, cache write-back, blank check. Results carry their tile key
//! over an unordered channel; the caller reassembles by coordinate, never
//! by arrival order.

use std::sync::mpsc;
use std::thread;

use chrono::NaiveDate;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cache::{CacheKey, TileCache};
use crate::coord::Tile;
use crate::provider::{ProviderError, TileSource};

use super::blank::is_blank_tile;
use super::progress::ProgressCounters;

/// Default number of pool workers.
pub const DEFAULT_WORKERS: usize = 10;

/// Outcome of the per-tile pipeline.
#[derive(Debug)]
pub enum TileStatus {
    /// Real imagery, ready for stitching.
    Fetched(Vec<u8>),
    /// The provider answered with a placeholder instead of imagery.
    Blank,
    /// Fetch or decode failed after all fallback layers.
    Failed(ProviderError),
}

impl TileStatus {
    pub fn is_fetched(&self) -> bool {
        matches!(self, TileStatus::Fetched(_))
    }
}

/// Run the worker pool over a tile list.
///
/// `date` of `None` requests each provider's latest imagery. Cancellation
/// stops dispatch promptly; tiles never dispatched are reported as
/// [`TileStatus::Failed`] with an HTTP-class error so callers can tell a
/// cancelled job from a completed one by the failure count.
pub fn run_pool(
    source: &(dyn TileSource + Sync),
    cache: &TileCache,
    tiles: &[Tile],
    date: Option<NaiveDate>,
    workers: usize,
    counters: &ProgressCounters,
) -> Vec<(Tile, TileStatus)> {
    let work: Mutex<Vec<Tile>> = Mutex::new(tiles.iter().rev().copied().collect());
    let (sender, receiver) = mpsc::channel::<(Tile, TileStatus)>();
    let workers = workers.clamp(1, tiles.len().max(1));

    thread::scope(|scope| {
        for _ in 0..workers {
            let sender = sender.clone();
            let work = &work;
            scope.spawn(move || loop {
                if counters.is_cancelled() {
                    break;
                }
                let Some(tile) = work.lock().pop() else {
                    break;
                };
                let status = process_tile(source, cache, &tile, date);
                counters.record(status.is_fetched());
                if sender.send((tile, status)).is_err() {
                    break;
                }
            });
        }
        drop(sender);

        let mut results: Vec<(Tile, TileStatus)> = receiver.iter().collect();

        // Anything still on the work list was skipped by cancellation.
        for tile in work.lock().drain(..) {
            counters.record(false);
            results.push((
                tile,
                TileStatus::Failed(ProviderError::Http("job cancelled".to_string())),
            ));
        }
        results
    })
}

/// The per-tile pipeline, independent per worker.
fn process_tile(
    source: &(dyn TileSource + Sync),
    cache: &TileCache,
    tile: &Tile,
    date: Option<NaiveDate>,
) -> TileStatus {
    let token = match date {
        Some(d) => source.cache_token(tile, d),
        None => source.latest_token(),
    };
    let key = CacheKey::new(source.name(), tile.zoom(), tile.col(), tile.row(), &token);

    match cache.get(&key) {
        Ok(Some(bytes)) => {
            debug!(%key, "serving tile from cache");
            return classify(bytes, tile);
        }
        Ok(None) => {}
        Err(e) => warn!(%key, error = %e, "cache read failed, fetching"),
    }

    let fetched = match date {
        Some(d) => source.fetch(tile, d),
        None => source.fetch_latest(tile),
    };
    let bytes = match fetched {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(tile = %tile, error = %e, "tile fetch failed");
            return TileStatus::Failed(e);
        }
    };

    if let Err(e) = cache.put(&key, &bytes) {
        warn!(%key, error = %e, "cache write failed, continuing");
    }
    classify(bytes, tile)
}

fn classify(bytes: Vec<u8>, tile: &Tile) -> TileStatus {
    match is_blank_tile(&bytes) {
        Ok(true) => {
            debug!(tile = %tile, "placeholder tile rejected");
            TileStatus::Blank
        }
        Ok(false) => TileStatus::Fetched(bytes),
        Err(e) => TileStatus::Failed(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::{BoundingBox, XyzTile};
    use crate::download::progress::CancelToken;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
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

    fn blank() -> Vec<u8> {
        let img = RgbaImage::from_pixel(256, 256, Rgba([255, 255, 255, 255]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    /// Tile source answering from a canned per-tile table.
    struct TableSource {
        responses: HashMap<(u32, u32), Result<Vec<u8>, ProviderError>>,
        fetches: Mutex<Vec<(u32, u32)>>,
    }

    impl TableSource {
        fn new(responses: HashMap<(u32, u32), Result<Vec<u8>, ProviderError>>) -> Self {
            Self {
                responses,
                fetches: Mutex::new(Vec::new()),
            }
        }
    }

    impl TileSource for TableSource {
        fn name(&self) -> &str {
            "table"
        }

        fn tiles_for(&self, _: &BoundingBox, _: u8) -> Result<Vec<Tile>, ProviderError> {
            Ok(Vec::new())
        }

        fn available_dates(
            &self,
            _: &BoundingBox,
            _: u8,
        ) -> Result<Vec<NaiveDate>, ProviderError> {
            Ok(Vec::new())
        }

        fn fetch(&self, tile: &Tile, _date: NaiveDate) -> Result<Vec<u8>, ProviderError> {
            self.fetches.lock().push((tile.col(), tile.row()));
            self.responses
                .get(&(tile.col(), tile.row()))
                .cloned()
                .unwrap_or_else(|| Err(ProviderError::Http("no entry".to_string())))
        }

        fn fetch_latest(&self, tile: &Tile) -> Result<Vec<u8>, ProviderError> {
            self.fetch(tile, NaiveDate::from_ymd_opt(2000, 1, 1).unwrap())
        }

        fn cache_token(&self, _: &Tile, date: NaiveDate) -> String {
            format!("d{}", date.format("%Y%m%d"))
        }

        fn latest_token(&self) -> String {
            "latest".to_string()
        }
    }

    fn xyz(col: u32, row: u32) -> Tile {
        Tile::Xyz(XyzTile::new(col, row, 10))
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 6, 1).unwrap()
    }

    #[test]
    fn test_pool_fetches_all_tiles() {
        let dir = TempDir::new().unwrap();
        let cache = TileCache::open(dir.path()).unwrap();
        let good = imagery();
        let mut responses = HashMap::new();
        let tiles: Vec<Tile> = (0..6).map(|i| xyz(i, 0)).collect();
        for i in 0..6 {
            responses.insert((i, 0), Ok(good.clone()));
        }
        let source = TableSource::new(responses);
        let counters = ProgressCounters::new(tiles.len(), CancelToken::new().flag());

        let results = run_pool(&source, &cache, &tiles, Some(date()), 3, &counters);

        assert_eq!(results.len(), 6);
        assert!(results.iter().all(|(_, s)| s.is_fetched()));
        assert_eq!(counters.completed(), 6);
        assert_eq!(counters.failed(), 0);
    }

    #[test]
    fn test_partial_failure_is_recorded_not_fatal() {
        let dir = TempDir::new().unwrap();
        let cache = TileCache::open(dir.path()).unwrap();
        let good = imagery();
        let mut responses = HashMap::new();
        let tiles: Vec<Tile> = (0..10).map(|i| xyz(i, 0)).collect();
        for i in 0..10 {
            if i < 3 {
                responses.insert((i, 0), Err(ProviderError::Http("503".to_string())));
            } else {
                responses.insert((i, 0), Ok(good.clone()));
            }
        }
        let source = TableSource::new(responses);
        let counters = ProgressCounters::new(tiles.len(), CancelToken::new().flag());

        let results = run_pool(&source, &cache, &tiles, Some(date()), 4, &counters);

        let fetched = results.iter().filter(|(_, s)| s.is_fetched()).count();
        assert_eq!(fetched, 7);
        assert_eq!(counters.failed(), 3);
        assert_eq!(counters.completed(), 10);
    }

    #[test]
    fn test_blank_tiles_are_rejected() {
        let dir = TempDir::new().unwrap();
        let cache = TileCache::open(dir.path()).unwrap();
        let mut responses = HashMap::new();
        responses.insert((0, 0), Ok(imagery()));
        responses.insert((1, 0), Ok(blank()));
        let tiles = vec![xyz(0, 0), xyz(1, 0)];
        let source = TableSource::new(responses);
        let counters = ProgressCounters::new(tiles.len(), CancelToken::new().flag());

        let results = run_pool(&source, &cache, &tiles, Some(date()), 2, &counters);

        let blanks = results
            .iter()
            .filter(|(_, s)| matches!(s, TileStatus::Blank))
            .count();
        assert_eq!(blanks, 1);
        assert_eq!(counters.failed(), 1);
    }

    #[test]
    fn test_second_run_hits_the_cache() {
        let dir = TempDir::new().unwrap();
        let cache = TileCache::open(dir.path()).unwrap();
        let mut responses = HashMap::new();
        responses.insert((0, 0), Ok(imagery()));
        let tiles = vec![xyz(0, 0)];
        let source = TableSource::new(responses);

        let counters = ProgressCounters::new(1, CancelToken::new().flag());
        run_pool(&source, &cache, &tiles, Some(date()), 1, &counters);
        let counters = ProgressCounters::new(1, CancelToken::new().flag());
        let results = run_pool(&source, &cache, &tiles, Some(date()), 1, &counters);

        assert!(results[0].1.is_fetched());
        assert_eq!(source.fetches.lock().len(), 1, "second run must not fetch");
    }

    #[test]
    fn test_cancellation_skips_remaining_work() {
        let dir = TempDir::new().unwrap();
        let cache = TileCache::open(dir.path()).unwrap();
        let tiles: Vec<Tile> = (0..8).map(|i| xyz(i, 0)).collect();
        let source = TableSource::new(HashMap::new());
        let token = CancelToken::new();
        token.cancel();
        let counters = ProgressCounters::new(tiles.len(), token.flag());

        let results = run_pool(&source, &cache, &tiles, Some(date()), 2, &counters);

        assert_eq!(results.len(), 8);
        assert!(source.fetches.lock().is_empty(), "no fetch after cancel");
        assert_eq!(counters.failed(), 8);
    }

    #[test]
    fn test_results_carry_tile_keys() {
        // Reassembly is by coordinate; every input tile appears exactly
        // once in the output regardless of worker scheduling.
        let dir = TempDir::new().unwrap();
        let cache = TileCache::open(dir.path()).unwrap();
        let good = imagery();
        let mut responses = HashMap::new();
        let tiles: Vec<Tile> = (0..12).map(|i| xyz(i % 4, i / 4)).collect();
        for t in &tiles {
            responses.insert((t.col(), t.row()), Ok(good.clone()));
        }
        let source = TableSource::new(responses);
        let counters = ProgressCounters::new(tiles.len(), CancelToken::new().flag());

        let mut results = run_pool(&source, &cache, &tiles, Some(date()), 5, &counters);
        results.sort_by_key(|(t, _)| (t.row(), t.col()));
        let keys: Vec<(u32, u32)> = results.iter().map(|(t, _)| (t.col(), t.row())).collect();
        let mut expected: Vec<(u32, u32)> = tiles.iter().map(|t| (t.col(), t.row())).collect();
        expected.sort_by_key(|&(c, r)| (r, c));
        assert_eq!(keys, expected);
    }
}
