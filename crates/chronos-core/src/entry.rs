//! Time entries - single spans of tracked work.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A logged span of tracked time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entry {
    /// Storage-assigned identifier.
    pub id: i64,

    /// The block this entry was logged under, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<i64>,

    /// The project this entry is billed to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<i64>,

    /// Free-text description of the work.
    pub summary: String,

    /// When the work started. `None` marks incomplete data.
    pub start_time: Option<DateTime<Utc>>,

    /// When the work ended. `None` marks incomplete data.
    pub end_time: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Whether the entry counts towards invoices.
    #[serde(default = "default_billable")]
    pub billable: bool,

    /// Whether the entry has already been invoiced.
    #[serde(default)]
    pub invoiced: bool,
}

const fn default_billable() -> bool {
    true
}

impl Entry {
    /// Returns `end - start`, or `None` when either bound is missing.
    ///
    /// The result may be zero or negative; callers decide what that means.
    pub fn duration(&self) -> Option<Duration> {
        Some(self.end_time? - self.start_time?)
    }

    /// Returns the duration in minutes, treating a missing bound as zero.
    pub fn minutes(&self) -> f64 {
        self.duration().map_or(0.0, duration_minutes)
    }
}

/// Converts a duration to fractional minutes.
///
/// Nanosecond precision, falling back to milliseconds for spans too long
/// to count in nanoseconds (about 292 years).
#[allow(clippy::cast_precision_loss)]
pub fn duration_minutes(duration: Duration) -> f64 {
    duration.num_nanoseconds().map_or_else(
        || duration.num_milliseconds() as f64 / 60_000.0,
        |nanos| nanos as f64 / 60_000_000_000.0,
    )
}

/// Anything that may or may not hold an [`Entry`].
///
/// Analysis functions accept slices of any `EntryRef`, so callers can pass
/// owned rows straight from storage as well as sparse collections where some
/// slots are empty. An empty slot is skipped or placed by policy, never an
/// error.
pub trait EntryRef {
    /// Returns the entry, or `None` for an empty slot.
    fn entry(&self) -> Option<&Entry>;
}

impl EntryRef for Entry {
    fn entry(&self) -> Option<&Entry> {
        Some(self)
    }
}

impl EntryRef for &Entry {
    fn entry(&self) -> Option<&Entry> {
        Some(*self)
    }
}

impl EntryRef for Box<Entry> {
    fn entry(&self) -> Option<&Entry> {
        Some(&**self)
    }
}

impl EntryRef for Option<Entry> {
    fn entry(&self) -> Option<&Entry> {
        self.as_ref()
    }
}

impl EntryRef for Option<&Entry> {
    fn entry(&self) -> Option<&Entry> {
        *self
    }
}
