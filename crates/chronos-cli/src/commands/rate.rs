//! `rate` command: persist the default hourly rate.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::config::{save_default_rate, writable_config_path};

pub fn run<W: Write>(writer: &mut W, config_path: Option<&Path>, amount: f64) -> Result<()> {
    if !amount.is_finite() || amount < 0.0 {
        bail!("rate must be a non-negative number, got {amount}");
    }
    let path = writable_config_path(config_path)
        .context("could not determine a config file location; pass --config")?;
    save_default_rate(&path, amount)?;
    writeln!(
        writer,
        "Default rate set to {amount:.2}/h in {}",
        path.display()
    )?;
    Ok(())
}
