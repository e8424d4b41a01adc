//! Block commands: time-boxed groupings such as sprints.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use chronos_core::{Block, DEFAULT_BLOCK_LENGTH, Entry, format_minutes, totals_by_project};
use chronos_db::{BlockFilter, Database, EntryFilter, NewBlock};

use super::analytics::ranked_totals;
use super::util::{end_after, project_names};

/// Starts a new block and makes it the active one.
pub fn start<W: Write>(
    writer: &mut W,
    db: &mut Database,
    name: &str,
    duration: Option<Duration>,
    client: Option<&str>,
    project: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()> {
    let length = duration.unwrap_or(DEFAULT_BLOCK_LENGTH);
    let end_time = end_after(now, length)?;
    let block = db.create_block(&NewBlock {
        name: name.to_string(),
        client: client.unwrap_or_default().to_string(),
        project: project.unwrap_or_default().to_string(),
        start_time: now,
        end_time,
    })?;
    writeln!(
        writer,
        "Block {} '{}' started, ends {}",
        block.id,
        block.name,
        block.end_time.format("%Y-%m-%d %H:%M")
    )?;
    Ok(())
}

/// Shows a block (the active one by default) with logged time per project.
pub fn show<W: Write>(writer: &mut W, db: &Database, id: Option<i64>) -> Result<()> {
    let block = match id {
        Some(id) => db
            .get_block(id)?
            .with_context(|| format!("block {id} not found"))?,
        None => match db.active_block()? {
            Some(block) => block,
            None => {
                writeln!(writer, "No active block.")?;
                return Ok(());
            }
        },
    };
    let entries = db.list_entries(&EntryFilter {
        block_id: Some(block.id),
        ..EntryFilter::default()
    })?;
    write_block_details(writer, &block, &entries, &project_names(db)?)
}

fn write_block_details<W: Write>(
    writer: &mut W,
    block: &Block,
    entries: &[Entry],
    names: &std::collections::HashMap<i64, String>,
) -> Result<()> {
    let logged: f64 = entries.iter().map(Entry::minutes).sum();

    writeln!(
        writer,
        "Block {}: {}{}",
        block.id,
        block.name,
        if block.active { " (active)" } else { "" }
    )?;
    if !block.client.is_empty() {
        writeln!(writer, "Client: {}", block.client)?;
    }
    if !block.project.is_empty() {
        writeln!(writer, "Project: {}", block.project)?;
    }
    writeln!(
        writer,
        "Period: {} to {}",
        block.start_time.format("%Y-%m-%d"),
        block.end_time.format("%Y-%m-%d")
    )?;
    write!(writer, "Logged: {} in {} entries", format_minutes(logged), entries.len())?;
    if let Some(progress) = block.progress_percent(logged) {
        write!(writer, " ({progress:.1}% of block)")?;
    }
    writeln!(writer)?;

    for (_, project, minutes) in ranked_totals(totals_by_project(entries), names) {
        writeln!(writer, "  {project}: {}", format_minutes(minutes))?;
    }
    Ok(())
}

pub fn list<W: Write>(
    writer: &mut W,
    db: &Database,
    client: Option<String>,
    project: Option<String>,
) -> Result<()> {
    let blocks = db.list_blocks(&BlockFilter { client, project })?;
    if blocks.is_empty() {
        writeln!(writer, "No blocks.")?;
        return Ok(());
    }
    for block in blocks {
        let mut line = format!(
            "{:<4}  {}  {} to {}",
            block.id,
            block.name,
            block.start_time.format("%Y-%m-%d"),
            block.end_time.format("%Y-%m-%d"),
        );
        let owner: Vec<&str> = [block.client.as_str(), block.project.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect();
        if !owner.is_empty() {
            line.push_str("  ");
            line.push_str(&owner.join(" / "));
        }
        if block.active {
            line.push_str("  [active]");
        }
        writeln!(writer, "{line}")?;
    }
    Ok(())
}

pub fn activate<W: Write>(writer: &mut W, db: &Database, id: i64) -> Result<()> {
    db.set_active_block(id)
        .with_context(|| format!("failed to activate block {id}"))?;
    writeln!(writer, "Block {id} is now active")?;
    Ok(())
}
