//! Aggregate analytics over in-memory entry collections.
//!
//! Every function here is total: empty slots, entries without a start time
//! and zero-length spans are handled by the skip/placement rules documented
//! on each function rather than by returning errors. Callers hand in rows as
//! they come out of storage, messy ones included.
//!
//! # Validity
//!
//! An entry is *valid* for ordering when the slot is occupied and the entry
//! has a start time. Invalid entries sort to the front when ascending and to
//! the back when descending, so malformed data shows up first in
//! chronological views and stays out of the way in "most recent first" ones.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::entry::{Entry, EntryRef};

/// Sort direction for [`sort_by_start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// A detected period of inactivity between two adjacent entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IdleGap {
    /// End of the earlier entry.
    pub start: DateTime<Utc>,
    /// Start of the later entry.
    pub end: DateTime<Utc>,
    #[serde(serialize_with = "serialize_minutes")]
    pub duration: Duration,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_minutes<S: serde::Serializer>(
    duration: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(duration.num_minutes())
}

/// Sums entry minutes per project.
///
/// Entries without a project are grouped under `None`. A project whose
/// entries add up to zero still appears with `0.0`; only projects absent
/// from the input are missing from the map.
pub fn totals_by_project<E: EntryRef>(entries: &[E]) -> HashMap<Option<i64>, f64> {
    let mut totals = HashMap::new();
    for entry in entries.iter().filter_map(EntryRef::entry) {
        *totals.entry(entry.project_id).or_insert(0.0) += entry.minutes();
    }
    totals
}

/// Sums minutes of every entry that started at or after `period_start`.
///
/// Entries without a start time are excluded. There is no upper bound: an
/// entry starting after "now" still counts, so this answers "how much was
/// logged since X" rather than "how much was logged between X and now".
pub fn period_total<E: EntryRef>(entries: &[E], period_start: DateTime<Utc>) -> f64 {
    entries
        .iter()
        .filter_map(EntryRef::entry)
        .filter(|entry| entry.start_time.is_some_and(|start| start >= period_start))
        .map(Entry::minutes)
        .sum()
}

/// Stable in-place sort by start time.
///
/// See the [module documentation](self) for where invalid entries land.
pub fn sort_by_start<E: EntryRef>(entries: &mut [E], direction: SortDirection) {
    entries.sort_by(|a, b| compare_start(a.entry(), b.entry(), direction));
}

fn start_key(entry: Option<&Entry>) -> Option<DateTime<Utc>> {
    entry.and_then(|entry| entry.start_time)
}

/// `None` orders before every instant, which puts invalid entries first when
/// ascending; reversing the comparison puts them last when descending.
fn compare_start(a: Option<&Entry>, b: Option<&Entry>, direction: SortDirection) -> Ordering {
    let (a, b) = (start_key(a), start_key(b));
    match direction {
        SortDirection::Ascending => a.cmp(&b),
        SortDirection::Descending => b.cmp(&a),
    }
}

/// Finds idle gaps of at least `min_gap` between chronologically adjacent
/// entries.
///
/// The input is not reordered; sorting happens on a private list of
/// references. Pairs are skipped when either slot is empty, the earlier entry
/// has no end time, or the later entry has no start time. Back-to-back and
/// overlapping entries never produce a gap, even with a zero threshold.
pub fn detect_idle_gaps<E: EntryRef>(entries: &[E], min_gap: Duration) -> Vec<IdleGap> {
    if entries.len() < 2 {
        return Vec::new();
    }

    let mut sorted: Vec<Option<&Entry>> = entries.iter().map(EntryRef::entry).collect();
    sort_by_start(&mut sorted, SortDirection::Ascending);

    let mut gaps = Vec::new();
    for pair in sorted.windows(2) {
        let (Some(prev), Some(next)) = (pair[0], pair[1]) else {
            continue;
        };
        let (Some(prev_end), Some(next_start)) = (prev.end_time, next.start_time) else {
            continue;
        };
        if next_start <= prev_end {
            continue;
        }
        let gap = next_start - prev_end;
        if gap >= min_gap {
            gaps.push(IdleGap {
                start: prev_end,
                end: next_start,
                duration: gap,
            });
        }
    }
    gaps
}
