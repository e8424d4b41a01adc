//! Invoicing and export commands.

use std::io::Write;

use anyhow::{Context, Result};
use chronos_core::{Entry, Invoice, SortDirection, build_invoice, format_minutes, sort_by_start};
use chronos_db::{Database, EntryFilter};
use clap::ValueEnum;
use serde::Serialize;

use super::util::{format_time, project_label, project_names};
use crate::Config;

/// Export output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ExportFormat {
    #[default]
    Json,
    Markdown,
}

/// Shows uninvoiced billable entries priced at their project rates.
pub fn invoice<W: Write>(
    writer: &mut W,
    db: &Database,
    config: &Config,
    block: Option<i64>,
    markdown: bool,
) -> Result<()> {
    let mut entries = db.list_entries(&EntryFilter {
        block_id: block,
        billable: Some(true),
        invoiced: Some(false),
        ..EntryFilter::default()
    })?;
    sort_by_start(&mut entries, SortDirection::Ascending);
    let invoice = build_invoice(&entries, &db.project_rates()?, config.default_rate);
    let names = project_names(db)?;

    if markdown {
        write!(writer, "{}", invoice.to_markdown(&names))?;
        return Ok(());
    }
    if invoice.lines.is_empty() {
        writeln!(writer, "Nothing to invoice.")?;
        return Ok(());
    }
    for line in &invoice.lines {
        writeln!(
            writer,
            "{:<4}  {}  {}  {:.2}h x {:.2} = {:.2}",
            line.entry_id,
            project_label(&names, line.project_id),
            line.summary,
            line.hours,
            line.rate,
            line.amount
        )?;
    }
    writeln!(
        writer,
        "Total: {:.2}h, {:.2}",
        invoice.total_hours, invoice.total_amount
    )?;
    Ok(())
}

/// Marks every unbilled entry as invoiced.
pub fn invoice_smart<W: Write>(writer: &mut W, db: &mut Database) -> Result<()> {
    let ids: Vec<i64> = db.unbilled_entries()?.iter().map(|e| e.id).collect();
    let marked = db
        .mark_entries_invoiced(&ids)
        .context("failed to mark entries invoiced")?;
    writeln!(writer, "Marked {marked} entries as invoiced.")?;
    Ok(())
}

/// Exports all entries, oldest first.
pub fn export_summary<W: Write>(writer: &mut W, db: &Database, format: ExportFormat) -> Result<()> {
    let mut entries = db.list_entries(&EntryFilter::default())?;
    sort_by_start(&mut entries, SortDirection::Ascending);

    match format {
        ExportFormat::Json => writeln!(writer, "{}", serde_json::to_string_pretty(&entries)?)?,
        ExportFormat::Markdown => {
            let names = project_names(db)?;
            writeln!(writer, "# Summary\n")?;
            writeln!(writer, "| Start | Project | Summary | Duration |")?;
            writeln!(writer, "|---|---|---|---|")?;
            let mut total = 0.0;
            for entry in &entries {
                total += entry.minutes();
                writeln!(
                    writer,
                    "| {} | {} | {} | {} |",
                    format_time(entry.start_time),
                    project_label(&names, entry.project_id),
                    entry.summary.replace('|', "\\|"),
                    format_minutes(entry.minutes())
                )?;
            }
            writeln!(writer, "\n**Total:** {}", format_minutes(total))?;
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct InvoiceExport<'a> {
    entries: &'a [Entry],
    #[serde(flatten)]
    invoice: &'a Invoice,
}

/// Exports billable entries, optionally limited to a block or a client's projects.
pub fn export_invoice<W: Write>(
    writer: &mut W,
    db: &Database,
    config: &Config,
    block: Option<i64>,
    client: Option<&str>,
    format: ExportFormat,
) -> Result<()> {
    let mut entries = db.list_entries(&EntryFilter {
        block_id: block,
        billable: Some(true),
        ..EntryFilter::default()
    })?;
    if let Some(client_name) = client {
        let client = db
            .find_client_by_name(client_name)?
            .with_context(|| format!("client '{client_name}' not found"))?;
        let project_ids: Vec<i64> = db
            .list_projects(Some(client.id))?
            .into_iter()
            .map(|p| p.id)
            .collect();
        entries.retain(|entry| {
            entry
                .project_id
                .is_some_and(|id| project_ids.contains(&id))
        });
    }
    sort_by_start(&mut entries, SortDirection::Ascending);
    let invoice = build_invoice(&entries, &db.project_rates()?, config.default_rate);

    match format {
        ExportFormat::Json => {
            let export = InvoiceExport {
                entries: &entries,
                invoice: &invoice,
            };
            writeln!(writer, "{}", serde_json::to_string_pretty(&export)?)?;
        }
        ExportFormat::Markdown => write!(writer, "{}", invoice.to_markdown(&project_names(db)?))?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{DateTime, Duration, TimeZone, Utc};
    use chronos_db::{NewEntry, NewProject};
    use insta::assert_snapshot;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 3, hour, 0, 0).unwrap()
    }

    /// Apollo (Acme, 100/h): 90m; Zeus (no client, no rate): 60m; unassigned 30m; one non-billable.
    fn seed(db: &Database) {
        let acme = db.create_client("Acme", "").unwrap();
        let apollo = db
            .create_project(&NewProject {
                name: "Apollo".to_string(),
                client_id: Some(acme.id),
                rate: 100.0,
            })
            .unwrap();
        let zeus = db
            .create_project(&NewProject {
                name: "Zeus".to_string(),
                client_id: None,
                rate: 0.0,
            })
            .unwrap();
        let rows = [
            (Some(apollo.id), "Apollo work", 9, 90, true),
            (Some(zeus.id), "Zeus work", 11, 60, true),
            (None, "Admin", 13, 30, true),
            (Some(apollo.id), "Internal", 15, 60, false),
        ];
        for (project_id, summary, hour, minutes, billable) in rows {
            db.create_entry(&NewEntry {
                block_id: None,
                project_id,
                summary: summary.to_string(),
                start_time: Some(at(hour)),
                end_time: Some(at(hour) + Duration::minutes(minutes)),
                billable,
            })
            .unwrap();
        }
    }

    fn config() -> Config {
        Config {
            default_rate: 50.0,
            ..Config::default()
        }
    }

    #[test]
    fn test_invoice_prices_unbilled_entries() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let mut output = Vec::new();
        invoice(&mut output, &db, &config(), None, false).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        1     Apollo  Apollo work  1.50h x 100.00 = 150.00
        2     Zeus  Zeus work  1.00h x 50.00 = 50.00
        3     (no project)  Admin  0.50h x 50.00 = 25.00
        Total: 3.00h, 225.00
        ");
    }

    #[test]
    fn test_invoice_markdown() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let mut output = Vec::new();
        invoice(&mut output, &db, &config(), None, true).unwrap();
        let text = String::from_utf8(output).unwrap();
        assert!(text.starts_with("# Invoice\n"));
        assert!(text.contains("| Apollo | Apollo work | 1.50 | 100.00 | 150.00 |"));
        assert!(text.contains("**Total Amount:** $225.00"));
    }

    #[test]
    fn test_invoice_smart_marks_only_unbilled() {
        let mut db = Database::open_in_memory().unwrap();
        seed(&db);
        let mut output = Vec::new();
        invoice_smart(&mut output, &mut db).unwrap();
        invoice_smart(&mut output, &mut db).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "Marked 3 entries as invoiced.\nMarked 0 entries as invoiced.\n"
        );
        assert!(!db.get_entry(4).unwrap().unwrap().invoiced);

        let mut output = Vec::new();
        invoice(&mut output, &db, &config(), None, false).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "Nothing to invoice.\n");
    }

    #[test]
    fn test_export_invoice_filters_by_client() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let mut output = Vec::new();
        export_invoice(&mut output, &db, &config(), None, Some("acme"), ExportFormat::Json)
            .unwrap();

        let export: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(export["entries"].as_array().unwrap().len(), 1);
        assert_eq!(export["lines"][0]["summary"], "Apollo work");
        assert_eq!(export["total_amount"], 150.0);

        assert!(
            export_invoice(&mut Vec::new(), &db, &config(), None, Some("Nobody"), ExportFormat::Json)
                .is_err()
        );
    }

    #[test]
    fn test_export_summary_markdown() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let mut output = Vec::new();
        export_summary(&mut output, &db, ExportFormat::Markdown).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        # Summary

        | Start | Project | Summary | Duration |
        |---|---|---|---|
        | 2025-06-03 09:00 | Apollo | Apollo work | 1h 30m |
        | 2025-06-03 11:00 | Zeus | Zeus work | 1h 0m |
        | 2025-06-03 13:00 | (no project) | Admin | 30m |
        | 2025-06-03 15:00 | Apollo | Internal | 1h 0m |

        **Total:** 4h 30m
        ");
    }

    #[test]
    fn test_export_summary_json_is_chronological() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let mut output = Vec::new();
        export_summary(&mut output, &db, ExportFormat::Json).unwrap();
        let entries: Vec<Entry> = serde_json::from_slice(&output).unwrap();
        let ids: Vec<i64> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }
}
