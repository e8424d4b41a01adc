//! Configuration loading and management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// How the CLI reaches the local model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// Run `ollama run <model> <prompt>`.
    Process,
    /// Call the Ollama HTTP API at `ollama_host`.
    Http,
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    pub ollama_host: String,
    pub ollama_model: String,
    pub llm_backend: LlmBackend,
    /// Per-call limit for model requests.
    pub llm_timeout_secs: u64,
    /// Hourly rate for projects without one of their own.
    pub default_rate: f64,
    /// Whether new entries are billable unless marked otherwise.
    pub default_billable: bool,
    /// Default `idle-detect` threshold.
    pub idle_threshold_minutes: i64,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("chronos.db"),
            ollama_host: "http://localhost:11434".to_string(),
            ollama_model: "llama2:7b".to_string(),
            llm_backend: LlmBackend::Process,
            llm_timeout_secs: 120,
            default_rate: 0.0,
            default_billable: true,
            idle_threshold_minutes: 120,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    ///
    /// Later sources win: defaults, the user config file, `config_path`,
    /// `CHRONOS_*` variables, then the plain `OLLAMA_HOST` / `OLLAMA_MODEL`.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment
            .merge(Env::prefixed("CHRONOS_"))
            .merge(Env::raw().only(&["OLLAMA_HOST", "OLLAMA_MODEL"]));

        figment.extract()
    }

    /// Builds an LLM client for the configured backend and model.
    pub fn llm_client(&self) -> Result<chronos_llm::Client, chronos_llm::LlmError> {
        let backend = match self.llm_backend {
            LlmBackend::Process => chronos_llm::Backend::ollama(),
            LlmBackend::Http => chronos_llm::Backend::Http {
                host: self.ollama_host.clone(),
            },
        };
        chronos_llm::Client::new(
            backend,
            self.ollama_model.clone(),
            Duration::from_secs(self.llm_timeout_secs),
        )
    }
}

/// The file `rate` writes to: `config_path` if given, else the user config file.
pub fn writable_config_path(config_path: Option<&Path>) -> Option<PathBuf> {
    config_path
        .map(Path::to_path_buf)
        .or_else(|| dirs_config_path().map(|dir| dir.join("config.toml")))
}

/// Sets `default_rate` in the TOML file at `path`, keeping every other key.
pub fn save_default_rate(path: &Path, rate: f64) -> anyhow::Result<()> {
    let mut table = if path.exists() {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        text.parse::<toml::Table>()
            .with_context(|| format!("failed to parse {}", path.display()))?
    } else {
        toml::Table::new()
    };
    table.insert("default_rate".to_string(), toml::Value::Float(rate));

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("failed to create config directory")?;
    }
    let text = toml::to_string_pretty(&table).context("failed to serialize config")?;
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    tracing::debug!(path = %path.display(), rate, "saved default rate");
    Ok(())
}

/// Returns the platform-specific config directory for chronos.
///
/// On Linux: `$XDG_CONFIG_HOME/chronos` or `~/.config/chronos`
pub fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("chronos"))
}

/// Returns the platform-specific data directory for chronos.
///
/// On Linux: `~/.local/share/chronos`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("chronos"))
}
