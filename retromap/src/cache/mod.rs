//! Disk-backed tile cache
//!
//! Content-addressed store for raw tile payloads, keyed by
//! (provider, zoom, column, row, date-or-epoch token). Entries are written
//! once on first successful fetch and never mutated; eviction is an
//! out-of-band maintenance concern (`clear`).
//!
//! Key components come from callers and ultimately from provider
//! responses, so every component is validated before touching the
//! filesystem: a component that would resolve outside the cache root is
//! rejected with [`CacheError::PathEscape`].

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, trace};

/// Errors that can occur during cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O error during cache operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A key component would resolve outside the cache root.
    #[error("cache key escapes cache root: {0:?}")]
    PathEscape(String),

    /// A key component is empty or contains characters that have no place
    /// in a cache key.
    #[error("invalid cache key component: {0:?}")]
    InvalidComponent(String),
}

/// Composite cache key for one tile payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub provider: String,
    pub zoom: u8,
    pub col: u32,
    pub row: u32,
    /// Date or epoch token, provider-specific (hex date, release id, ...).
    pub token: String,
}

impl CacheKey {
    pub fn new(provider: &str, zoom: u8, col: u32, row: u32, token: &str) -> Self {
        Self {
            provider: provider.to_string(),
            zoom,
            col,
            row,
            token: token.to_string(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}_{}_{}",
            self.provider, self.zoom, self.col, self.row, self.token
        )
    }
}

/// Aggregate cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: u64,
    pub bytes: u64,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} entries, {} bytes", self.entries, self.bytes)
    }
}

/// Disk-backed tile payload store.
pub struct TileCache {
    root: PathBuf,
}

impl TileCache {
    /// Open (and create if needed) a cache rooted at `root`.
    pub fn open(root: &Path) -> Result<Self, CacheError> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to its on-disk path, rejecting anything that would
    /// land outside the cache root.
    fn entry_path(&self, key: &CacheKey) -> Result<PathBuf, CacheError> {
        validate_component(&key.provider)?;
        validate_component(&key.token)?;

        let path = self
            .root
            .join(&key.provider)
            .join(key.zoom.to_string())
            .join(format!("{}_{}_{}.bin", key.col, key.row, key.token));

        // Lexical containment check on top of the per-component rules.
        if !path.starts_with(&self.root) {
            return Err(CacheError::PathEscape(key.to_string()));
        }
        Ok(path)
    }

    /// Look up a cached payload. `None` on miss.
    pub fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.entry_path(key)?;
        match fs::read(&path) {
            Ok(bytes) => {
                trace!(%key, bytes = bytes.len(), "cache hit");
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                trace!(%key, "cache miss");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Store a payload. Entries are write-once; an existing entry is left
    /// untouched.
    pub fn put(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), CacheError> {
        let path = self.entry_path(key)?;
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write-then-rename so a crashed write never leaves a truncated
        // entry behind.
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        trace!(%key, bytes = bytes.len(), "cache write");
        Ok(())
    }

    /// Walk the cache and total up entries and bytes.
    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let mut stats = CacheStats::default();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let meta = entry.metadata()?;
                if meta.is_dir() {
                    pending.push(entry.path());
                } else {
                    stats.entries += 1;
                    stats.bytes += meta.len();
                }
            }
        }
        Ok(stats)
    }

    /// Remove every cached entry, keeping the root directory itself.
    pub fn clear(&self) -> Result<CacheStats, CacheError> {
        let stats = self.stats()?;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.metadata()?.is_dir() {
                fs::remove_dir_all(entry.path())?;
            } else {
                fs::remove_file(entry.path())?;
            }
        }
        debug!(%stats, "cache cleared");
        Ok(stats)
    }
}

/// Caller-supplied key components must be plain names: no separators, no
/// parent references, no absolute paths.
fn validate_component(component: &str) -> Result<(), CacheError> {
    if component.is_empty() {
        return Err(CacheError::InvalidComponent(component.to_string()));
    }
    if component.contains('/') || component.contains('\\') || component.contains("..") {
        return Err(CacheError::PathEscape(component.to_string()));
    }
    if component.starts_with('.') || component.contains(':') {
        return Err(CacheError::InvalidComponent(component.to_string()));
    }
    Ok(())
}
