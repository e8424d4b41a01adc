//! Shared utilities for CLI commands.

use std::collections::HashMap;
use std::future::Future;
use std::sync::LazyLock;

use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chronos_core::{Project, sanitize_name};
use chronos_db::{Database, NewProject};
use regex::Regex;

use crate::Config;

/// Pre-compiled regex for relative time parsing.
static RELATIVE_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s+(minute|hour|day|week)s?\s+ago$").unwrap());

/// Conservative bounds for relative time parsing (~1000 years in minutes).
const MAX_RELATIVE_MINUTES: i64 = 1000 * 365 * 24 * 60;

/// Label for entries without a project.
pub const NO_PROJECT: &str = "(no project)";

/// Parse a datetime string as RFC 3339, a calendar date, or relative time.
///
/// Supports:
/// - RFC 3339: "2026-01-15T10:30:00Z"
/// - Date: "2026-01-15" (midnight UTC)
/// - Relative: "2 hours ago", "30 minutes ago", "1 day ago", "1 week ago"
pub fn parse_datetime(s: &str) -> anyhow::Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::MIN).and_utc());
    }

    let Some(caps) = RELATIVE_TIME_RE.captures(s) else {
        anyhow::bail!(
            "Invalid datetime: {s}. Use RFC 3339 (e.g., 2026-01-15T10:30:00Z), a date (2026-01-15) or relative (e.g., '2 hours ago')"
        );
    };

    let n: i64 = caps[1]
        .parse()
        .context("failed to parse number in relative time")?;

    let (max_for_unit, minutes_per_unit) = match &caps[2] {
        "minute" => (MAX_RELATIVE_MINUTES, 1),
        "hour" => (MAX_RELATIVE_MINUTES / 60, 60),
        "day" => (MAX_RELATIVE_MINUTES / (60 * 24), 60 * 24),
        "week" => (MAX_RELATIVE_MINUTES / (60 * 24 * 7), 60 * 24 * 7),
        unit => anyhow::bail!("Unknown time unit: {unit}"),
    };

    if n > max_for_unit {
        anyhow::bail!("Relative time value too large: {n} {}", &caps[2]);
    }

    let duration = Duration::minutes(n * minutes_per_unit);
    Ok(Utc::now() - duration)
}

/// Formats an optional instant for tables; absent times render as `-`.
pub fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map_or_else(
        || "-".to_string(),
        |t| t.format("%Y-%m-%d %H:%M").to_string(),
    )
}

/// Looks up a project by name, creating it with no client and no rate if missing.
pub fn resolve_project(db: &Database, name: &str) -> anyhow::Result<Project> {
    let name = sanitize_name(name);
    if name.trim().is_empty() {
        anyhow::bail!("project name is empty after removing unsupported characters");
    }
    if let Some(project) = db.find_project_by_name(&name)? {
        return Ok(project);
    }
    tracing::debug!(%name, "creating project on first use");
    let project = db.create_project(&NewProject {
        name,
        client_id: None,
        rate: 0.0,
    })?;
    Ok(project)
}

/// Maps project ids to names.
pub fn project_names(db: &Database) -> anyhow::Result<HashMap<i64, String>> {
    Ok(db
        .list_projects(None)?
        .into_iter()
        .map(|project| (project.id, project.name))
        .collect())
}

/// Display name for an optional project id.
pub fn project_label(names: &HashMap<i64, String>, project_id: Option<i64>) -> String {
    match project_id {
        Some(id) => names.get(&id).cloned().unwrap_or_else(|| format!("#{id}")),
        None => NO_PROJECT.to_string(),
    }
}

/// Returns `start + length`, failing instead of overflowing the calendar.
pub fn end_after(start: DateTime<Utc>, length: Duration) -> anyhow::Result<DateTime<Utc>> {
    start.checked_add_signed(length).with_context(|| {
        format!(
            "duration of {} days runs past the supported date range",
            length.num_days()
        )
    })
}

/// Builds the configured LLM client.
pub fn llm_client(config: &Config) -> anyhow::Result<chronos_llm::Client> {
    config
        .llm_client()
        .context("failed to create LLM client")
}

/// Runs one async LLM call to completion on a fresh runtime.
pub fn block_on<F: Future>(future: F) -> anyhow::Result<F::Output> {
    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    Ok(runtime.block_on(future))
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    #[test]
    fn test_end_after_rejects_overflow() {
        let start = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
        assert_eq!(
            end_after(start, Duration::hours(2)).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 2, 11, 0, 0).unwrap()
        );
        let err = end_after(start, Duration::weeks(100_000_000)).unwrap_err();
        assert!(err.to_string().contains("past the supported date range"));
    }

    #[test]
    fn test_parse_datetime_rfc3339() {
        let dt = parse_datetime("2026-01-15T10:30:00+02:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2026, 1, 15, 8, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_datetime_date_only() {
        let dt = parse_datetime("2026-01-15").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_datetime_relative() {
        let before = Utc::now();
        let dt = parse_datetime("2 hours ago").unwrap();
        let after = Utc::now();
        assert!(dt >= before - Duration::hours(2));
        assert!(dt <= after - Duration::hours(2));

        assert!(parse_datetime("1 week ago").is_ok());
        assert!(parse_datetime("30 minutes ago").is_ok());
    }

    #[test]
    fn test_parse_datetime_invalid() {
        assert!(parse_datetime("yesterday-ish").is_err());
        assert!(parse_datetime("2026-13-45").is_err());
        assert!(parse_datetime("99999999999 weeks ago").is_err());
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(None), "-");
        assert_eq!(
            format_time(Some(Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 0).unwrap())),
            "2025-03-04 05:06"
        );
    }

    #[test]
    fn test_resolve_project_creates_once() {
        let db = Database::open_in_memory().unwrap();
        let first = resolve_project(&db, "Apollo!").unwrap();
        let second = resolve_project(&db, "apollo").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.name, "Apollo");
        assert!(resolve_project(&db, "!!!").is_err());
    }

    #[test]
    fn test_project_label() {
        let names: HashMap<i64, String> = [(1, "Apollo".to_string())].into_iter().collect();
        assert_eq!(project_label(&names, Some(1)), "Apollo");
        assert_eq!(project_label(&names, Some(9)), "#9");
        assert_eq!(project_label(&names, None), NO_PROJECT);
    }
}
