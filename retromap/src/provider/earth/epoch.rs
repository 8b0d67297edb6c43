//! Epoch resolution policy for historical tile fetches.
//!
//! A tile's reported epoch is not guaranteed to match the epoch under which
//! pixel data actually exists. Fetches therefore walk an ordered candidate
//! list built from three layers, stopping at the first success:
//!
//! 1. the epoch the metadata reports for the exact date on the exact tile;
//! 2. every other epoch present in that tile's metadata, in descending
//!    order of how many distinct dates reference it;
//! 3. a fixed list of empirically known-good epochs, newest first.
//!
//! Each layer is a pure function from metadata to candidates; composition
//! and deduplication happen in [`epoch_candidates`], so an epoch is never
//! attempted twice.

use std::collections::HashMap;

use super::dates::PackedDate;
use super::packet::TileMetadata;

/// Epochs observed to hold pixel data even when the metadata omits them.
/// Ordered newest first. Tunable; extend as the provider rolls new storage.
pub const KNOWN_GOOD_EPOCHS: &[u32] = &[394, 383, 375, 369, 357, 345, 336, 329, 311, 302];

/// Layer 1: the exact-date epoch, if reported.
fn exact_date_epoch(meta: &TileMetadata, date: PackedDate) -> Vec<u32> {
    meta.epoch_for_date(date).into_iter().collect()
}

/// Layer 2: remaining metadata epochs, most broadly referenced first.
///
/// Breadth is the number of distinct dates referencing the epoch; ties
/// break toward the higher epoch so the order is fully deterministic.
fn metadata_epochs_by_breadth(meta: &TileMetadata) -> Vec<u32> {
    let mut distinct: HashMap<u32, Vec<PackedDate>> = HashMap::new();
    for entry in &meta.entries {
        let dates = distinct.entry(entry.epoch).or_default();
        if !dates.contains(&entry.date) {
            dates.push(entry.date);
        }
    }

    let mut ranked: Vec<(u32, usize)> = distinct
        .into_iter()
        .map(|(epoch, dates)| (epoch, dates.len()))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.cmp(&a.0)));
    ranked.into_iter().map(|(epoch, _)| epoch).collect()
}

/// The full ordered candidate list for one (tile, date) fetch.
///
/// Deterministic for fixed inputs and free of duplicates.
pub fn epoch_candidates(
    meta: Option<&TileMetadata>,
    date: PackedDate,
    known_good: &[u32],
) -> Vec<u32> {
    let mut candidates = Vec::new();
    let mut push = |epoch: u32, out: &mut Vec<u32>| {
        if !out.contains(&epoch) {
            out.push(epoch);
        }
    };

    if let Some(meta) = meta {
        for epoch in exact_date_epoch(meta, date) {
            push(epoch, &mut candidates);
        }
        for epoch in metadata_epochs_by_breadth(meta) {
            push(epoch, &mut candidates);
        }
    }
    for &epoch in known_good {
        push(epoch, &mut candidates);
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::earth::packet::DatedEntry;

    fn meta(entries: &[(u32, u32)]) -> TileMetadata {
        TileMetadata {
            entries: entries
                .iter()
                .map(|&(raw, epoch)| DatedEntry {
                    date: PackedDate::from_raw(raw),
                    epoch,
                })
                .collect(),
        }
    }

    #[test]
    fn test_exact_date_epoch_comes_first() {
        let meta = meta(&[(10, 300), (11, 310), (12, 310), (13, 320)]);
        let candidates = epoch_candidates(Some(&meta), PackedDate::from_raw(13), &[]);
        assert_eq!(candidates[0], 320);
    }

    #[test]
    fn test_breadth_ordering() {
        // 310 referenced by two distinct dates, 300 and 320 by one each
        let meta = meta(&[(10, 300), (11, 310), (12, 310), (13, 320)]);
        let candidates = epoch_candidates(Some(&meta), PackedDate::from_raw(10), &[]);
        assert_eq!(candidates, vec![300, 310, 320]);
    }

    #[test]
    fn test_duplicate_dates_count_once() {
        // Same date listed twice for 300 must not inflate its breadth
        let meta = meta(&[(10, 300), (10, 300), (11, 310), (12, 310)]);
        let candidates = epoch_candidates(Some(&meta), PackedDate::from_raw(99), &[]);
        assert_eq!(candidates, vec![310, 300]);
    }

    #[test]
    fn test_tie_breaks_toward_higher_epoch() {
        let meta = meta(&[(10, 300), (11, 340)]);
        let candidates = epoch_candidates(Some(&meta), PackedDate::from_raw(99), &[]);
        assert_eq!(candidates, vec![340, 300]);
    }

    #[test]
    fn test_known_good_appended_without_repeats() {
        let meta = meta(&[(10, 345), (11, 345)]);
        let candidates =
            epoch_candidates(Some(&meta), PackedDate::from_raw(10), &[394, 345, 302]);
        assert_eq!(candidates, vec![345, 394, 302]);
    }

    #[test]
    fn test_no_metadata_uses_known_good_only() {
        let candidates = epoch_candidates(None, PackedDate::from_raw(10), KNOWN_GOOD_EPOCHS);
        assert_eq!(candidates, KNOWN_GOOD_EPOCHS.to_vec());
    }

    #[test]
    fn test_deterministic_and_duplicate_free() {
        let meta = meta(&[(10, 300), (11, 310), (12, 310), (13, 320), (14, 300)]);
        let a = epoch_candidates(Some(&meta), PackedDate::from_raw(11), KNOWN_GOOD_EPOCHS);
        let b = epoch_candidates(Some(&meta), PackedDate::from_raw(11), KNOWN_GOOD_EPOCHS);
        assert_eq!(a, b);

        let mut deduped = a.clone();
        deduped.dedup();
        deduped.sort_unstable();
        let mut sorted = a.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), a.len(), "candidate list must be duplicate free");
    }
}
