//! Local-model helpers: questions, suggestions, reminders, completion and
//! block summaries.

use std::io::Write;

use anyhow::{Context, Result, bail};
use chronos_core::{Block, Entry};
use chronos_db::{BlockFilter, Database, EntryFilter};

use super::util::{block_on, llm_client};
use crate::Config;

fn context_data(db: &Database) -> Result<(Vec<Entry>, Vec<Block>)> {
    let entries = db.list_entries(&EntryFilter::default())?;
    let blocks = db.list_blocks(&BlockFilter::default())?;
    Ok((entries, blocks))
}

/// Answers a question about the tracked data and records it in history.
pub fn ask<W: Write>(writer: &mut W, db: &Database, config: &Config, question: &str) -> Result<()> {
    let question = question.trim();
    if question.is_empty() {
        bail!("question is empty");
    }
    db.save_query(question)?;

    let (entries, blocks) = context_data(db)?;
    let client = llm_client(config)?;
    let answer = block_on(client.answer_query(question, &entries, &blocks))?
        .context("failed to answer question")?;
    writeln!(writer, "{answer}")?;
    Ok(())
}

pub fn suggest<W: Write>(writer: &mut W, db: &Database, config: &Config) -> Result<()> {
    let (entries, blocks) = context_data(db)?;
    let client = llm_client(config)?;
    let suggestion = block_on(client.suggest_next_entry(&entries, &blocks))?
        .context("failed to get a suggestion")?;
    writeln!(writer, "{suggestion}")?;
    Ok(())
}

pub fn remind<W: Write>(writer: &mut W, db: &Database, config: &Config) -> Result<()> {
    let (entries, blocks) = context_data(db)?;
    let client = llm_client(config)?;
    let reminder = block_on(client.smart_reminder(&entries, &blocks))?
        .context("failed to get a reminder")?;
    writeln!(writer, "{reminder}")?;
    Ok(())
}

pub fn complete<W: Write>(
    writer: &mut W,
    db: &Database,
    config: &Config,
    partial: &str,
) -> Result<()> {
    let (entries, blocks) = context_data(db)?;
    let client = llm_client(config)?;
    let completion = block_on(client.autocomplete(partial, &entries, &blocks))?
        .context("failed to get completions")?;
    writeln!(writer, "{completion}")?;
    Ok(())
}

/// Summarizes a block, the active one by default.
pub fn summarize<W: Write>(
    writer: &mut W,
    db: &Database,
    config: &Config,
    block_id: Option<i64>,
) -> Result<()> {
    let block = match block_id {
        Some(id) => db
            .get_block(id)?
            .with_context(|| format!("block {id} not found"))?,
        None => db
            .active_block()?
            .context("no active block; pass --block <ID>")?,
    };
    let entries = db.list_entries(&EntryFilter {
        block_id: Some(block.id),
        ..EntryFilter::default()
    })?;
    let client = llm_client(config)?;
    let summary = block_on(client.summarize_block(&block, &entries))?
        .context("failed to summarize block")?;
    writeln!(writer, "{summary}")?;
    Ok(())
}

/// Lists recent questions, newest first.
pub fn history<W: Write>(writer: &mut W, db: &Database, limit: usize) -> Result<()> {
    let queries = db.query_history(limit)?;
    if queries.is_empty() {
        writeln!(writer, "No questions asked yet.")?;
        return Ok(());
    }
    for (index, query) in queries.iter().enumerate() {
        writeln!(writer, "{}. {query}", index + 1)?;
    }
    Ok(())
}
