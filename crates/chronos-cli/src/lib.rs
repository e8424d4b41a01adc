//! Chronos CLI library.
//!
//! Argument definitions, configuration and the subcommand implementations
//! behind the `chronos` binary.

mod cli;
pub mod commands;
mod config;

pub use cli::{BlockAction, ClientAction, Cli, Commands, ExportAction, ProjectAction};
pub use config::{Config, LlmBackend};
