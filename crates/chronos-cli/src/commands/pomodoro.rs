//! `pomodoro` command: time a focus session and log it as an entry.

use std::io::Write;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, Utc};
use chronos_core::format_minutes;
use chronos_db::{Database, NewEntry};

use super::util::{block_on, end_after, format_time, resolve_project};

/// Length of a session when none is given.
pub const DEFAULT_SESSION_LENGTH: Duration = Duration::minutes(25);

const SESSION_PROJECT: &str = "Pomodoro";
const SESSION_SUMMARY: &str = "Focus Session: Pomodoro focus session";

/// Runs a focus session of `length` and records it as a non-billable entry.
///
/// With `wait` the session starts at `now` and the command sleeps until it
/// ends. Without it, a session that just finished at `now` is logged.
pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    length: Duration,
    wait: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    if length <= Duration::zero() {
        bail!("session length must be positive");
    }

    let start = if wait {
        let end = end_after(now, length)?;
        let sleep = length.to_std().context("session length is out of range")?;
        writeln!(
            writer,
            "Focus session started: {}, ends {}",
            format_minutes(chronos_core::duration_minutes(length)),
            format_time(Some(end))
        )?;
        writer.flush()?;
        block_on(tokio::time::sleep(sleep))?;
        now
    } else {
        now.checked_sub_signed(length)
            .context("session length runs past the supported date range")?
    };
    let end = end_after(start, length)?;

    let block = db.active_block()?;
    let project_name = block
        .as_ref()
        .map(|block| block.project.clone())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| SESSION_PROJECT.to_string());
    let project = resolve_project(db, &project_name)?;

    let entry = db.create_entry(&NewEntry {
        block_id: block.as_ref().map(|block| block.id),
        project_id: Some(project.id),
        summary: SESSION_SUMMARY.to_string(),
        start_time: Some(start),
        end_time: Some(end),
        billable: false,
    })?;
    tracing::debug!(id = entry.id, "pomodoro session logged");

    writeln!(
        writer,
        "Pomodoro complete: logged {} to {} as entry {}",
        format_minutes(entry.minutes()),
        project.name,
        entry.id
    )?;
    Ok(())
}
