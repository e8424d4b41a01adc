//! Invoice computation from billable entries.

use std::collections::HashMap;
use std::fmt::Write;

use serde::Serialize;

use crate::entry::EntryRef;

/// One billed entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceLine {
    pub entry_id: i64,
    pub project_id: Option<i64>,
    pub summary: String,
    pub hours: f64,
    pub rate: f64,
    pub amount: f64,
}

/// An invoice over a set of entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invoice {
    pub lines: Vec<InvoiceLine>,
    pub total_hours: f64,
    pub total_amount: f64,
}

/// Builds an invoice, pricing each entry at its project's rate.
///
/// Entries without a project, or whose project has no positive rate, are
/// priced at `default_rate`. Lines keep input order; empty slots are skipped.
pub fn build_invoice<E: EntryRef>(
    entries: &[E],
    rates: &HashMap<i64, f64>,
    default_rate: f64,
) -> Invoice {
    let mut lines = Vec::new();
    let mut total_hours = 0.0;
    let mut total_amount = 0.0;

    for entry in entries.iter().filter_map(EntryRef::entry) {
        let hours = entry.minutes() / 60.0;
        let rate = entry
            .project_id
            .and_then(|id| rates.get(&id).copied())
            .filter(|rate| *rate > 0.0)
            .unwrap_or(default_rate);
        let amount = hours * rate;

        total_hours += hours;
        total_amount += amount;
        lines.push(InvoiceLine {
            entry_id: entry.id,
            project_id: entry.project_id,
            summary: entry.summary.clone(),
            hours,
            rate,
            amount,
        });
    }

    Invoice {
        lines,
        total_hours,
        total_amount,
    }
}

impl Invoice {
    /// Renders the invoice as a Markdown table.
    ///
    /// `project_names` maps project ids to display names; unknown projects
    /// render as `-`.
    pub fn to_markdown(&self, project_names: &HashMap<i64, String>) -> String {
        let mut md = String::from(
            "# Invoice\n\n| Project | Summary | Hours | Rate | Amount |\n|---|---|---|---|---|\n",
        );
        for line in &self.lines {
            let project = line
                .project_id
                .and_then(|id| project_names.get(&id))
                .map_or("-", String::as_str);
            let summary = line.summary.replace('|', "\\|");
            let _ = writeln!(
                md,
                "| {project} | {summary} | {:.2} | {:.2} | {:.2} |",
                line.hours, line.rate, line.amount
            );
        }
        let _ = write!(
            md,
            "\n**Total Hours:** {:.2}\n**Total Amount:** ${:.2}\n",
            self.total_hours, self.total_amount
        );
        md
    }
}
