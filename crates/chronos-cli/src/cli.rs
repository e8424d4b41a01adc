//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::Duration;
use chronos_core::parse_duration;
use clap::{Parser, Subcommand};

use crate::commands::analytics::ReviewPeriod;
use crate::commands::entry::{AddArgs, EditArgs, ListArgs};
use crate::commands::invoice::ExportFormat;

/// Command-line time tracker.
///
/// Records time entries and blocks in a local SQLite database, with
/// analytics, invoicing and optional local-LLM helpers.
#[derive(Debug, Parser)]
#[command(name = "chronos", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Add a time entry.
    Add(AddArgs),

    /// Edit an entry; with no field flags, toggle its invoiced state.
    Edit(EditArgs),

    /// Delete an entry.
    Delete {
        /// Entry ID.
        id: i64,
    },

    /// List entries.
    List(ListArgs),

    /// Manage blocks.
    #[command(subcommand)]
    Block(BlockAction),

    /// Manage projects.
    #[command(subcommand)]
    Project(ProjectAction),

    /// Manage clients.
    #[command(subcommand)]
    Client(ClientAction),

    /// Show time per project.
    Analytics {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Review the last week or month.
    Review {
        #[arg(value_enum, default_value_t = ReviewPeriod::Week)]
        period: ReviewPeriod,

        /// Add a summary written by the local model.
        #[arg(long)]
        summary: bool,
    },

    /// Find idle gaps between entries.
    IdleDetect {
        /// Smallest gap to report (e.g. 90m, 2h). Defaults to the configured threshold.
        #[arg(long, value_parser = parse_duration)]
        min_gap: Option<Duration>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show uninvoiced billable entries with amounts.
    Invoice {
        /// Only entries in this block.
        #[arg(long)]
        block: Option<i64>,

        /// Render as a Markdown table.
        #[arg(long)]
        markdown: bool,
    },

    /// Mark all unbilled entries as invoiced.
    InvoiceSmart,

    /// Export data.
    #[command(subcommand)]
    Export(ExportAction),

    /// Save, show or list entry templates.
    Template {
        /// Template name; lists all templates when omitted.
        name: Option<String>,

        /// Template text; shows the template when omitted.
        text: Vec<String>,
    },

    /// Ask a question about your tracked time.
    #[command(visible_alias = "query")]
    Ask {
        #[arg(required = true)]
        question: Vec<String>,
    },

    /// Suggest the next entry.
    Suggest,

    /// Get a reminder based on recent activity.
    Remind,

    /// Complete a partial project, client or task name.
    Complete { partial: String },

    /// Summarize a block (the active one by default).
    Summarize {
        #[arg(long)]
        block: Option<i64>,
    },

    /// Show recently asked questions.
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Run a focus session and log it as a non-billable entry.
    Pomodoro {
        /// Session length (e.g. 25m, 50m).
        #[arg(value_parser = parse_duration)]
        duration: Option<Duration>,

        /// Log a session that just ended instead of waiting for it.
        #[arg(long)]
        no_wait: bool,
    },

    /// Set the default hourly rate.
    Rate { amount: f64 },

    /// Check configuration, database and model runner.
    Doctor,
}

/// Block subcommands.
#[derive(Debug, Subcommand)]
pub enum BlockAction {
    /// Start a new block and make it active.
    Start {
        name: String,

        /// Block length (e.g. 2w, 10d). Defaults to two weeks.
        #[arg(long, value_parser = parse_duration)]
        duration: Option<Duration>,

        #[arg(long)]
        client: Option<String>,

        #[arg(long)]
        project: Option<String>,
    },

    /// Show a block with logged time (the active one by default).
    Show { id: Option<i64> },

    /// List blocks.
    List {
        #[arg(long)]
        client: Option<String>,

        #[arg(long)]
        project: Option<String>,
    },

    /// Make a block the active one.
    Activate { id: i64 },
}

/// Project subcommands.
#[derive(Debug, Subcommand)]
pub enum ProjectAction {
    /// Add a project.
    Add {
        name: String,

        /// Client name.
        #[arg(long)]
        client: Option<String>,

        /// Hourly rate.
        #[arg(long)]
        rate: Option<f64>,
    },

    /// List projects.
    List,
}

/// Client subcommands.
#[derive(Debug, Subcommand)]
pub enum ClientAction {
    /// Add a client.
    Add {
        name: String,

        /// Contact details.
        #[arg(long)]
        contact: Option<String>,
    },

    /// List clients.
    List,
}

/// Export subcommands.
#[derive(Debug, Subcommand)]
pub enum ExportAction {
    /// Export all entries.
    Summary {
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
    },

    /// Export billable entries as an invoice.
    Invoice {
        #[arg(long)]
        block: Option<i64>,

        /// Only projects of this client.
        #[arg(long)]
        client: Option<String>,

        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_query_alias_parses_as_ask() {
        let cli = Cli::try_parse_from(["chronos", "query", "how", "much?"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Ask { ref question }) if question == &["how", "much?"]
        ));
    }

    #[test]
    fn test_duration_flags_parse() {
        let cli = Cli::try_parse_from(["chronos", "idle-detect", "--min-gap", "90m"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::IdleDetect { min_gap: Some(gap), .. }) if gap == Duration::minutes(90)
        ));
        assert!(Cli::try_parse_from(["chronos", "idle-detect", "--min-gap", "soon"]).is_err());
    }

    #[test]
    fn test_pomodoro_duration_is_optional() {
        let cli = Cli::try_parse_from(["chronos", "pomodoro"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Pomodoro { duration: None, no_wait: false })
        ));
        let cli = Cli::try_parse_from(["chronos", "pomodoro", "50m", "--no-wait"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Pomodoro { duration: Some(length), no_wait: true })
                if length == Duration::minutes(50)
        ));
    }

    #[test]
    fn test_list_invoiced_flags_conflict() {
        assert!(Cli::try_parse_from(["chronos", "list", "--invoiced", "--uninvoiced"]).is_err());
    }
}
