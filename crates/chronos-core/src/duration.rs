//! Human-friendly duration parsing and formatting.

use std::sync::LazyLock;

use chrono::Duration;
use regex::Regex;
use thiserror::Error;

/// One `<number><unit>` group, e.g. `90m` or `2w`.
static DURATION_PART_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)([smhdw])").expect("duration regex is valid"));

/// Duration parse errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("empty duration")]
    Empty,
    #[error("invalid duration '{0}': expected minutes (e.g. 90) or units like 45m, 1h30m, 2w")]
    Invalid(String),
    #[error("duration '{0}' is too large")]
    Overflow(String),
}

/// Parses a duration such as `90`, `45m`, `1h30m`, `10d` or `2w`.
///
/// A bare integer is read as minutes. Units are `s`, `m`, `h`, `d` and `w`
/// and may be combined in any order.
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let trimmed = input.trim().to_lowercase();
    if trimmed.is_empty() {
        return Err(DurationParseError::Empty);
    }

    if let Ok(minutes) = trimmed.parse::<i64>() {
        return Duration::try_minutes(minutes)
            .ok_or_else(|| DurationParseError::Overflow(input.to_string()));
    }

    let mut consumed = 0;
    let mut total = Duration::zero();
    for caps in DURATION_PART_RE.captures_iter(&trimmed) {
        let whole = caps.get(0).map_or("", |m| m.as_str());
        consumed += whole.len();

        let value: i64 = caps[1]
            .parse()
            .map_err(|_| DurationParseError::Overflow(input.to_string()))?;
        let part = match &caps[2] {
            "s" => Duration::try_seconds(value),
            "m" => Duration::try_minutes(value),
            "h" => Duration::try_hours(value),
            "d" => Duration::try_days(value),
            "w" => Duration::try_weeks(value),
            _ => None,
        }
        .ok_or_else(|| DurationParseError::Overflow(input.to_string()))?;

        total = total
            .checked_add(&part)
            .ok_or_else(|| DurationParseError::Overflow(input.to_string()))?;
    }

    // Every character must belong to a unit group; "1h foo" is not a duration.
    if consumed == 0 || consumed != trimmed.len() {
        return Err(DurationParseError::Invalid(input.to_string()));
    }
    Ok(total)
}

/// Formats minutes as `"Xh Ym"` (one hour or more) or `"Ym"`.
///
/// Negative values render as `0m`.
#[allow(clippy::cast_possible_truncation)]
pub fn format_minutes(minutes: f64) -> String {
    if minutes.is_nan() || minutes <= 0.0 {
        return "0m".to_string();
    }
    let total = minutes.round() as i64;
    let hours = total / 60;
    let rest = total % 60;
    if hours >= 1 {
        format!("{hours}h {rest}m")
    } else {
        format!("{rest}m")
    }
}
