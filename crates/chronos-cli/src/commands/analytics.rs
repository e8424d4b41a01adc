//! Aggregate views: per-project analytics, period reviews and idle gaps.

use std::collections::HashMap;
use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Duration, Months, Utc};
use chronos_core::{
    Entry, detect_idle_gaps, duration_minutes, format_minutes, period_total, totals_by_project,
};
use chronos_db::{Database, EntryFilter};
use clap::ValueEnum;
use serde::Serialize;

use super::util::{block_on, llm_client, project_label, project_names};
use crate::Config;

/// Review window, counted back from now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ReviewPeriod {
    #[default]
    Week,
    Month,
}

impl ReviewPeriod {
    fn start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Week => now - Duration::days(7),
            Self::Month => now
                .checked_sub_months(Months::new(1))
                .unwrap_or_else(|| now - Duration::days(30)),
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Week => "week",
            Self::Month => "month",
        }
    }
}

#[derive(Debug, Serialize)]
struct ProjectTotal {
    project_id: Option<i64>,
    project: String,
    minutes: f64,
    hours: f64,
}

/// Per-project minutes, largest first, ties by name.
pub fn ranked_totals(
    totals: HashMap<Option<i64>, f64>,
    names: &HashMap<i64, String>,
) -> Vec<(Option<i64>, String, f64)> {
    let mut rows: Vec<(Option<i64>, String, f64)> = totals
        .into_iter()
        .map(|(project_id, minutes)| (project_id, project_label(names, project_id), minutes))
        .collect();
    rows.sort_by(|a, b| b.2.total_cmp(&a.2).then_with(|| a.1.cmp(&b.1)));
    rows
}

pub fn analytics<W: Write>(writer: &mut W, db: &Database, json: bool) -> Result<()> {
    let entries = db.list_entries(&EntryFilter::default())?;
    let rows = ranked_totals(totals_by_project(&entries), &project_names(db)?);

    if json {
        let output: Vec<ProjectTotal> = rows
            .into_iter()
            .map(|(project_id, project, minutes)| ProjectTotal {
                project_id,
                project,
                minutes,
                hours: minutes / 60.0,
            })
            .collect();
        writeln!(writer, "{}", serde_json::to_string_pretty(&output)?)?;
        return Ok(());
    }

    if rows.is_empty() {
        writeln!(writer, "No entries.")?;
        return Ok(());
    }
    writeln!(writer, "Time by project:")?;
    let mut total = 0.0;
    for (_, project, minutes) in &rows {
        total += minutes;
        writeln!(
            writer,
            "  {project}: {} ({:.2}h)",
            format_minutes(*minutes),
            minutes / 60.0
        )?;
    }
    writeln!(writer, "Total: {}", format_minutes(total))?;
    Ok(())
}

pub fn review<W: Write>(
    writer: &mut W,
    db: &Database,
    config: &Config,
    period: ReviewPeriod,
    summary: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let since = period.start(now);
    let entries = db.list_entries(&EntryFilter::default())?;
    let total = period_total(&entries, since);

    let in_period: Vec<&Entry> = entries
        .iter()
        .filter(|entry| entry.start_time.is_some_and(|start| start >= since))
        .collect();
    let rows = ranked_totals(totals_by_project(&in_period), &project_names(db)?);

    writeln!(
        writer,
        "Review of the last {} (since {}): {}",
        period.label(),
        since.format("%Y-%m-%d %H:%M"),
        format_minutes(total)
    )?;
    for (_, project, minutes) in &rows {
        writeln!(writer, "  {project}: {}", format_minutes(*minutes))?;
    }

    if summary {
        let hours: Vec<(String, f64)> = rows
            .into_iter()
            .map(|(_, project, minutes)| (project, minutes / 60.0))
            .collect();
        let client = llm_client(config)?;
        match block_on(client.review_summary(period.label(), &hours))? {
            Ok(text) => writeln!(writer, "\n{text}")?,
            Err(err) => writeln!(writer, "\nSummary unavailable: {err}")?,
        }
    }
    Ok(())
}

pub fn idle_detect<W: Write>(
    writer: &mut W,
    db: &Database,
    min_gap: Duration,
    json: bool,
) -> Result<()> {
    let entries = db.list_entries(&EntryFilter::default())?;
    let gaps = detect_idle_gaps(&entries, min_gap);
    tracing::debug!(entries = entries.len(), gaps = gaps.len(), "idle detection");

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&gaps)?)?;
        return Ok(());
    }

    let threshold = format_minutes(duration_minutes(min_gap));
    if gaps.is_empty() {
        writeln!(writer, "No idle gaps of at least {threshold}.")?;
        return Ok(());
    }
    writeln!(writer, "Idle gaps of at least {threshold}:")?;
    for gap in gaps {
        writeln!(
            writer,
            "  {} to {} ({})",
            gap.start.format("%Y-%m-%d %H:%M"),
            gap.end.format("%Y-%m-%d %H:%M"),
            format_minutes(duration_minutes(gap.duration))
        )?;
    }
    Ok(())
}
