//! `doctor` command: check the local setup.

use std::io::Write;
use std::path::Path;

use anyhow::Result;

use super::util::block_on;
use crate::Config;
use crate::config::writable_config_path;

pub fn run<W: Write>(writer: &mut W, config: &Config, config_path: Option<&Path>) -> Result<()> {
    writeln!(writer, "chronos doctor")?;

    match writable_config_path(config_path) {
        Some(path) if path.exists() => writeln!(writer, "[ok]   config file: {}", path.display())?,
        Some(path) => writeln!(
            writer,
            "[info] config file: {} (not found, using defaults)",
            path.display()
        )?,
        None => writeln!(writer, "[info] config file: no config directory")?,
    }

    if config.database_path.exists() {
        writeln!(writer, "[ok]   database: {}", config.database_path.display())?;
    } else {
        writeln!(
            writer,
            "[warn] database: {} (created on first use)",
            config.database_path.display()
        )?;
    }

    match config.llm_client() {
        Ok(client) => {
            let available = block_on(client.is_available())?;
            let target = match client.backend() {
                chronos_llm::Backend::Process { program } => program.clone(),
                chronos_llm::Backend::Http { host } => host.clone(),
            };
            if available {
                writeln!(writer, "[ok]   model runner: {target} ({})", client.model())?;
            } else {
                writeln!(
                    writer,
                    "[warn] model runner: {target} not reachable; LLM features are unavailable"
                )?;
            }
        }
        Err(err) => writeln!(writer, "[warn] model runner: {err}")?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::LlmBackend;

    #[test]
    fn test_doctor_reports_missing_pieces() {
        let temp = tempfile::tempdir().unwrap();
        let config_path = temp.path().join("config.toml");
        let config = Config {
            database_path: temp.path().join("chronos.db"),
            llm_backend: LlmBackend::Http,
            ollama_host: "http://127.0.0.1:9".to_string(),
            llm_timeout_secs: 5,
            ..Config::default()
        };

        let mut output = Vec::new();
        run(&mut output, &config, Some(&config_path)).unwrap();
        let output = String::from_utf8(output).unwrap();

        assert!(output.contains("(not found, using defaults)"));
        assert!(output.contains("(created on first use)"));
        assert!(output.contains("[warn] model runner: http://127.0.0.1:9 not reachable"));
    }

    #[test]
    fn test_doctor_finds_existing_files() {
        let temp = tempfile::tempdir().unwrap();
        let config_path = temp.path().join("config.toml");
        std::fs::write(&config_path, "default_rate = 10.0\n").unwrap();
        let db_path = temp.path().join("chronos.db");
        chronos_db::Database::open(&db_path).unwrap();
        let config = Config {
            database_path: db_path,
            ollama_model: String::new(),
            ..Config::default()
        };

        let mut output = Vec::new();
        run(&mut output, &config, Some(&config_path)).unwrap();
        let output = String::from_utf8(output).unwrap();

        assert!(output.contains("[ok]   config file:"));
        assert!(output.contains("[ok]   database:"));
        assert!(output.contains("[warn] model runner: invalid model"));
    }
}
