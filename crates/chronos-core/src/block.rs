//! Blocks - time-boxed groupings of entries such as sprints.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default block length when none is given.
pub const DEFAULT_BLOCK_LENGTH: Duration = Duration::weeks(2);

/// A time-boxed grouping of entries. At most one block is active.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub id: i64,
    pub name: String,
    /// Client name; empty when unset.
    #[serde(default)]
    pub client: String,
    /// Project name; empty when unset.
    #[serde(default)]
    pub project: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Block {
    /// Planned length of the block.
    pub fn length(&self) -> Duration {
        self.end_time - self.start_time
    }

    /// Logged minutes as a percentage of the planned length.
    ///
    /// Returns `None` for blocks with no positive length.
    #[allow(clippy::cast_precision_loss)]
    pub fn progress_percent(&self, logged_minutes: f64) -> Option<f64> {
        let planned = self.length().num_minutes();
        (planned > 0).then(|| logged_minutes / planned as f64 * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    fn block(days: i64) -> Block {
        let start = Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap();
        Block {
            id: 1,
            name: "Sprint 1".to_string(),
            client: String::new(),
            project: String::new(),
            start_time: start,
            end_time: start + Duration::days(days),
            active: true,
            created_at: start,
        }
    }

    #[test]
    fn progress_is_share_of_planned_length() {
        let progress = block(1).progress_percent(720.0).unwrap();
        assert!((progress - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn progress_is_none_for_empty_blocks() {
        assert!(block(0).progress_percent(30.0).is_none());
    }

    #[test]
    fn default_length_is_two_weeks() {
        assert_eq!(DEFAULT_BLOCK_LENGTH.num_days(), 14);
    }
}
