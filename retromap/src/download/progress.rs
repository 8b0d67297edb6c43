//! Progress reporting for tile download jobs.
//!
//! Workers update shared atomic counters; the orchestrator snapshots them
//! and invokes the caller's callback. The counters are the only mutable
//! state shared across workers.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Progress callback for download jobs.
///
/// # Arguments
///
/// * `downloaded` - Tiles finished (successfully or not)
/// * `total` - Total tiles in the job
/// * `percent` - `downloaded / total` as a percentage
/// * `status` - Free-form status line for display
/// * `current_date` - 1-based index of the date being processed
/// * `total_dates` - Number of dates in the batch
pub type ProgressCallback = Box<dyn Fn(usize, usize, f64, &str, usize, usize) + Send + Sync>;

/// Free-form status sink for log-style messages.
pub type StatusCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Shared per-job progress counters.
///
/// Safe to share across the worker pool; every field is atomic.
#[derive(Debug)]
pub struct ProgressCounters {
    completed: AtomicUsize,
    failed: AtomicUsize,
    total: usize,
    cancelled: Arc<AtomicBool>,
}

impl ProgressCounters {
    pub fn new(total: usize, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            total,
            cancelled,
        }
    }

    /// Record one finished tile.
    pub fn record(&self, success: bool) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        if !success {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.completed() as f64 / self.total as f64 * 100.0
    }

    /// Cooperative cancellation flag shared with the job owner.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Handle for cancelling a running job from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub(crate) fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}
