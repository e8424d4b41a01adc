use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use chronos_cli::commands::{
    analytics, assist, block, doctor, entry, invoice, pomodoro, project, rate, template,
};
use chronos_cli::{BlockAction, ClientAction, Cli, Commands, Config, ExportAction, ProjectAction};

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(chronos_db::Database, Config)> {
    let config = load_config(config_path)?;

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = chronos_db::Database::open(&config.database_path).context("failed to open database")?;
    Ok((db, config))
}

fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

#[expect(
    clippy::too_many_lines,
    reason = "CLI command dispatch is inherently verbose"
)]
fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let config_path = cli.config.as_deref();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let now = Utc::now();

    match &cli.command {
        Some(Commands::Add(args)) => {
            let (db, config) = open_database(config_path)?;
            entry::add(&mut out, &db, &config, args, now)?;
        }
        Some(Commands::Edit(args)) => {
            let (db, _config) = open_database(config_path)?;
            entry::edit(&mut out, &db, args)?;
        }
        Some(Commands::Delete { id }) => {
            let (db, _config) = open_database(config_path)?;
            entry::delete(&mut out, &db, *id)?;
        }
        Some(Commands::List(args)) => {
            let (db, _config) = open_database(config_path)?;
            entry::list(&mut out, &db, args)?;
        }
        Some(Commands::Block(action)) => {
            let (mut db, _config) = open_database(config_path)?;
            match action {
                BlockAction::Start {
                    name,
                    duration,
                    client,
                    project,
                } => block::start(
                    &mut out,
                    &mut db,
                    name,
                    *duration,
                    client.as_deref(),
                    project.as_deref(),
                    now,
                )?,
                BlockAction::Show { id } => block::show(&mut out, &db, *id)?,
                BlockAction::List { client, project } => {
                    block::list(&mut out, &db, client.clone(), project.clone())?;
                }
                BlockAction::Activate { id } => block::activate(&mut out, &db, *id)?,
            }
        }
        Some(Commands::Project(action)) => {
            let (db, _config) = open_database(config_path)?;
            match action {
                ProjectAction::Add { name, client, rate } => {
                    project::add_project(&mut out, &db, name, client.as_deref(), *rate)?;
                }
                ProjectAction::List => project::list_projects(&mut out, &db)?,
            }
        }
        Some(Commands::Client(action)) => {
            let (db, _config) = open_database(config_path)?;
            match action {
                ClientAction::Add { name, contact } => {
                    project::add_client(&mut out, &db, name, contact.as_deref())?;
                }
                ClientAction::List => project::list_clients(&mut out, &db)?,
            }
        }
        Some(Commands::Analytics { json }) => {
            let (db, _config) = open_database(config_path)?;
            analytics::analytics(&mut out, &db, *json)?;
        }
        Some(Commands::Review { period, summary }) => {
            let (db, config) = open_database(config_path)?;
            analytics::review(&mut out, &db, &config, *period, *summary, now)?;
        }
        Some(Commands::IdleDetect { min_gap, json }) => {
            let (db, config) = open_database(config_path)?;
            let min_gap = match min_gap {
                Some(gap) => *gap,
                None => Duration::try_minutes(config.idle_threshold_minutes)
                    .context("idle_threshold_minutes is out of range")?,
            };
            analytics::idle_detect(&mut out, &db, min_gap, *json)?;
        }
        Some(Commands::Invoice { block, markdown }) => {
            let (db, config) = open_database(config_path)?;
            invoice::invoice(&mut out, &db, &config, *block, *markdown)?;
        }
        Some(Commands::InvoiceSmart) => {
            let (mut db, _config) = open_database(config_path)?;
            invoice::invoice_smart(&mut out, &mut db)?;
        }
        Some(Commands::Export(action)) => {
            let (db, config) = open_database(config_path)?;
            match action {
                ExportAction::Summary { format } => {
                    invoice::export_summary(&mut out, &db, *format)?;
                }
                ExportAction::Invoice {
                    block,
                    client,
                    format,
                } => invoice::export_invoice(
                    &mut out,
                    &db,
                    &config,
                    *block,
                    client.as_deref(),
                    *format,
                )?,
            }
        }
        Some(Commands::Template { name, text }) => {
            let (db, _config) = open_database(config_path)?;
            template::run(&mut out, &db, name.as_deref(), text)?;
        }
        Some(Commands::Ask { question }) => {
            let (db, config) = open_database(config_path)?;
            assist::ask(&mut out, &db, &config, &question.join(" "))?;
        }
        Some(Commands::Suggest) => {
            let (db, config) = open_database(config_path)?;
            assist::suggest(&mut out, &db, &config)?;
        }
        Some(Commands::Remind) => {
            let (db, config) = open_database(config_path)?;
            assist::remind(&mut out, &db, &config)?;
        }
        Some(Commands::Complete { partial }) => {
            let (db, config) = open_database(config_path)?;
            assist::complete(&mut out, &db, &config, partial)?;
        }
        Some(Commands::Summarize { block }) => {
            let (db, config) = open_database(config_path)?;
            assist::summarize(&mut out, &db, &config, *block)?;
        }
        Some(Commands::History { limit }) => {
            let (db, _config) = open_database(config_path)?;
            assist::history(&mut out, &db, *limit)?;
        }
        Some(Commands::Pomodoro { duration, no_wait }) => {
            let (db, _config) = open_database(config_path)?;
            let length = duration.unwrap_or(pomodoro::DEFAULT_SESSION_LENGTH);
            pomodoro::run(&mut out, &db, length, !*no_wait, now)?;
        }
        Some(Commands::Rate { amount }) => {
            // Writes the config file only; the database is never opened.
            rate::run(&mut out, config_path, *amount)?;
        }
        Some(Commands::Doctor) => {
            let config = load_config(config_path)?;
            doctor::run(&mut out, &config, config_path)?;
        }
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            writeln!(out)?;
        }
    }

    out.flush()?;
    Ok(())
}
