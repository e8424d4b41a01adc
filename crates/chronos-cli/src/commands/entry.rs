//! Entry commands: `add`, `edit`, `delete` and `list`.

use std::io::Write;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, Utc};
use clap::Args;
use chronos_core::{
    Block, Entry, SortDirection, format_minutes, parse_duration, sanitize_description,
    sanitize_name, sort_by_start,
};
use chronos_db::{Database, EntryFilter, NewEntry};

use super::util::{
    NO_PROJECT, block_on, end_after, format_time, llm_client, parse_datetime, project_label,
    project_names, resolve_project,
};
use crate::Config;

/// Duration used when the model reports neither an end nor a duration.
const DEFAULT_LLM_ENTRY_MINUTES: i64 = 30;

#[derive(Debug, Args)]
pub struct AddArgs {
    /// Entry text: `<duration> <project> <task> [description..]`, or free text with --llm.
    pub text: Vec<String>,

    /// Override the entry duration (e.g. 45m, 1h30m).
    #[arg(long, value_parser = parse_duration)]
    pub scale: Option<Duration>,

    /// Show a suggested next entry first.
    #[arg(long)]
    pub suggest: bool,

    /// Parse free text with the local model and show feedback afterwards.
    #[arg(long)]
    pub llm: bool,

    /// Project name, overriding the one in the text.
    #[arg(long)]
    pub project: Option<String>,

    /// Record the entry as non-billable.
    #[arg(long)]
    pub non_billable: bool,
}

#[derive(Debug, Args)]
pub struct EditArgs {
    /// Entry ID.
    pub id: i64,

    /// New summary.
    #[arg(long)]
    pub summary: Option<String>,

    /// New start time.
    #[arg(long, value_parser = parse_datetime)]
    pub start: Option<DateTime<Utc>>,

    /// New end time.
    #[arg(long, value_parser = parse_datetime)]
    pub end: Option<DateTime<Utc>>,

    /// New project name.
    #[arg(long)]
    pub project: Option<String>,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Only entries in this block.
    #[arg(long)]
    pub block: Option<i64>,

    /// Only entries for this project name.
    #[arg(long)]
    pub project: Option<String>,

    /// Only entries starting at or after this time.
    #[arg(long, value_parser = parse_datetime)]
    pub from: Option<DateTime<Utc>>,

    /// Only entries starting at or before this time.
    #[arg(long, value_parser = parse_datetime)]
    pub to: Option<DateTime<Utc>>,

    /// Only invoiced entries.
    #[arg(long, conflicts_with = "uninvoiced")]
    pub invoiced: bool,

    /// Only entries not yet invoiced.
    #[arg(long)]
    pub uninvoiced: bool,

    /// Oldest first.
    #[arg(long)]
    pub asc: bool,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// An entry parsed from the `<duration> <project> <task> [description..]` form.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ManualEntry {
    duration: Duration,
    project: String,
    summary: String,
}

fn parse_manual(text: &[String]) -> Result<ManualEntry> {
    let words: Vec<&str> = text.iter().flat_map(|part| part.split_whitespace()).collect();
    let [duration, project, task, description @ ..] = words.as_slice() else {
        bail!(
            "could not parse entry '{}': expected <duration> <project> <task> [description..]",
            text.join(" ")
        );
    };
    let duration = parse_duration(duration)?;
    let task = sanitize_name(task);
    let description = sanitize_description(&description.join(" "));
    let summary = if description.is_empty() {
        task
    } else {
        format!("{task}: {description}")
    };
    Ok(ManualEntry {
        duration,
        project: (*project).to_string(),
        summary,
    })
}

pub fn add<W: Write>(
    writer: &mut W,
    db: &Database,
    config: &Config,
    args: &AddArgs,
    now: DateTime<Utc>,
) -> Result<()> {
    if args.suggest {
        let entries = db.list_entries(&EntryFilter::default())?;
        let blocks = db.list_blocks(&chronos_db::BlockFilter::default())?;
        let client = llm_client(config)?;
        match block_on(client.suggest_next_entry(&entries, &blocks))? {
            Ok(suggestion) => writeln!(writer, "Suggestion: {suggestion}")?,
            Err(err) => writeln!(writer, "Suggestion unavailable: {err}")?,
        }
    }
    if args.text.is_empty() {
        if args.suggest {
            return Ok(());
        }
        bail!("no entry text given: expected <duration> <project> <task> [description..]");
    }

    let active_block = db.active_block()?;
    let (summary, project, start, end) = if args.llm {
        let client = llm_client(config)?;
        let parsed = block_on(client.parse_entry(&args.text.join(" ")))?
            .context("failed to parse entry with the local model")?;
        let start = parsed.start_time.unwrap_or(now);
        let end = match (args.scale, parsed.end_time) {
            (Some(scale), _) => end_after(start, scale)?,
            (None, Some(end)) => end,
            (None, None) => {
                let minutes = parsed.duration_minutes.unwrap_or(DEFAULT_LLM_ENTRY_MINUTES);
                let length = Duration::try_minutes(minutes).with_context(|| {
                    format!("model duration of {minutes} minutes is out of range")
                })?;
                end_after(start, length)?
            }
        };
        (parsed.display_summary(), parsed.project, start, end)
    } else {
        let manual = parse_manual(&args.text)?;
        let duration = args.scale.unwrap_or(manual.duration);
        (manual.summary, Some(manual.project), now, end_after(now, duration)?)
    };

    let project_name = args
        .project
        .clone()
        .or(project)
        .or_else(|| {
            active_block
                .as_ref()
                .map(|block| block.project.clone())
                .filter(|name| !name.trim().is_empty())
        });
    let project = project_name
        .map(|name| resolve_project(db, &name))
        .transpose()?;

    let entry = db.create_entry(&NewEntry {
        block_id: active_block.as_ref().map(|block| block.id),
        project_id: project.as_ref().map(|p| p.id),
        summary,
        start_time: Some(start),
        end_time: Some(end),
        billable: config.default_billable && !args.non_billable,
    })?;
    tracing::debug!(id = entry.id, "entry added");

    writeln!(writer, "Entry {} added", entry.id)?;
    writeln!(writer, "Summary: {}", entry.summary)?;
    writeln!(
        writer,
        "Project: {}",
        project.as_ref().map_or(NO_PROJECT, |p| p.name.as_str())
    )?;
    if let Some(block) = &active_block {
        writeln!(writer, "Block: {}", block.name)?;
    }
    writeln!(writer, "Duration: {}", format_minutes(entry.minutes()))?;
    writeln!(writer, "Start: {}", format_time(entry.start_time))?;

    if args.llm {
        write_feedback(writer, db, config, &entry, active_block.as_ref())?;
    }
    Ok(())
}

fn write_feedback<W: Write>(
    writer: &mut W,
    db: &Database,
    config: &Config,
    entry: &Entry,
    block: Option<&Block>,
) -> Result<()> {
    let entries = db.list_entries(&EntryFilter {
        block_id: block.map(|b| b.id),
        ..EntryFilter::default()
    })?;
    let client = llm_client(config)?;
    match block_on(client.feedback_after_entry(entry, &entries, block))? {
        Ok(feedback) => writeln!(writer, "{feedback}")?,
        Err(err) => {
            tracing::warn!(%err, "feedback unavailable");
            writeln!(writer, "Feedback unavailable: {err}")?;
        }
    }
    Ok(())
}

pub fn edit<W: Write>(writer: &mut W, db: &Database, args: &EditArgs) -> Result<()> {
    let mut entry = db
        .get_entry(args.id)?
        .with_context(|| format!("entry {} not found", args.id))?;

    let has_changes = args.summary.is_some()
        || args.start.is_some()
        || args.end.is_some()
        || args.project.is_some();
    if !has_changes {
        entry.invoiced = !entry.invoiced;
        db.update_entry(&mut entry)?;
        let state = if entry.invoiced { "invoiced" } else { "not invoiced" };
        writeln!(writer, "Entry {} marked {state}", entry.id)?;
        return Ok(());
    }

    if let Some(summary) = &args.summary {
        entry.summary.clone_from(summary);
    }
    if let Some(start) = args.start {
        entry.start_time = Some(start);
    }
    if let Some(end) = args.end {
        entry.end_time = Some(end);
    }
    if let Some(name) = &args.project {
        entry.project_id = Some(resolve_project(db, name)?.id);
    }
    db.update_entry(&mut entry)?;
    writeln!(writer, "Entry {} updated", entry.id)?;
    Ok(())
}

pub fn delete<W: Write>(writer: &mut W, db: &Database, id: i64) -> Result<()> {
    db.delete_entry(id)
        .with_context(|| format!("failed to delete entry {id}"))?;
    writeln!(writer, "Entry {id} deleted")?;
    Ok(())
}

pub fn list<W: Write>(writer: &mut W, db: &Database, args: &ListArgs) -> Result<()> {
    let project_id = match &args.project {
        Some(name) => Some(
            db.find_project_by_name(name)?
                .with_context(|| format!("project '{name}' not found"))?
                .id,
        ),
        None => None,
    };
    let invoiced = if args.invoiced {
        Some(true)
    } else if args.uninvoiced {
        Some(false)
    } else {
        None
    };

    let mut entries = db.list_entries(&EntryFilter {
        block_id: args.block,
        project_id,
        invoiced,
        billable: None,
        from: args.from,
        to: args.to,
    })?;
    let direction = if args.asc {
        SortDirection::Ascending
    } else {
        SortDirection::Descending
    };
    sort_by_start(&mut entries, direction);

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&entries)?)?;
        return Ok(());
    }
    write_entry_table(writer, &entries, &project_names(db)?)
}

fn write_entry_table<W: Write>(
    writer: &mut W,
    entries: &[Entry],
    names: &std::collections::HashMap<i64, String>,
) -> Result<()> {
    if entries.is_empty() {
        writeln!(writer, "No entries.")?;
        return Ok(());
    }
    for entry in entries {
        let mut flags = String::new();
        if entry.invoiced {
            flags.push_str(" [invoiced]");
        }
        if !entry.billable {
            flags.push_str(" [non-billable]");
        }
        writeln!(
            writer,
            "{:<4}  {:<16}  {:>8}  {}  {}{flags}",
            entry.id,
            format_time(entry.start_time),
            format_minutes(entry.minutes()),
            project_label(names, entry.project_id),
            entry.summary,
        )?;
    }
    Ok(())
}
