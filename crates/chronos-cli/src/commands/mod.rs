//! CLI subcommand implementations.

pub mod analytics;
pub mod assist;
pub mod block;
pub mod doctor;
pub mod entry;
pub mod invoice;
pub mod pomodoro;
pub mod project;
pub mod rate;
pub mod template;
pub mod util;
