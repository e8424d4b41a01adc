//! Core domain logic for the chronos time tracker.
//!
//! This crate contains the fundamental types and logic for:
//! - Entries, blocks, projects and clients
//! - Analysis: per-project totals, period totals, chronological sorting and
//!   idle gap detection
//! - Invoicing, duration parsing and input sanitizing

pub mod analysis;
pub mod block;
pub mod duration;
pub mod entry;
pub mod invoice;
pub mod project;
pub mod sanitize;

pub use analysis::{
    IdleGap, SortDirection, detect_idle_gaps, period_total, sort_by_start, totals_by_project,
};
pub use block::{Block, DEFAULT_BLOCK_LENGTH};
pub use duration::{DurationParseError, format_minutes, parse_duration};
pub use entry::{Entry, EntryRef, duration_minutes};
pub use invoice::{Invoice, InvoiceLine, build_invoice};
pub use project::{Client, Project};
pub use sanitize::{is_present, sanitize_description, sanitize_name};
