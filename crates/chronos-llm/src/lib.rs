//! Local LLM integration for the chronos time tracker.
//!
//! Talks to an Ollama model either by running `ollama run <model> <prompt>`
//! as a subprocess or through the Ollama HTTP API. Provides:
//! - Natural-language entry parsing
//! - Block summaries, post-entry feedback and period reviews
//! - Question answering, next-entry suggestions, reminders and autocomplete

use std::fmt::{self, Write as _};
use std::time::Duration;

use chrono::{DateTime, Utc};
use chronos_core::{Block, Entry, EntryRef, format_minutes, parse_duration};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;

/// Default time allowed for one model call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
/// Default subprocess runner.
pub const DEFAULT_PROGRAM: &str = "ollama";
/// Most entries rendered into a prompt as context.
const CONTEXT_ENTRY_LIMIT: usize = 50;

/// LLM client errors.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The model name was rejected.
    #[error("invalid model: {reason}")]
    InvalidModel { reason: &'static str },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// API returned an error response.
    #[error("API error: {message}")]
    Api { message: String },
    /// The runner could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// The runner exited unsuccessfully.
    #[error("{program} exited with {status}: {output}")]
    Process {
        program: String,
        status: String,
        output: String,
    },
    /// The model did not answer in time.
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// How prompts reach the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Runs `<program> run <model> <prompt>` and reads stdout.
    Process { program: String },
    /// Posts to `<host>/api/generate`.
    Http { host: String },
}

impl Backend {
    /// The `ollama` subprocess backend.
    pub fn ollama() -> Self {
        Self::Process {
            program: DEFAULT_PROGRAM.to_string(),
        }
    }
}

/// Ollama client.
///
/// Cloning shares the underlying HTTP connection pool.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    backend: Backend,
    model: String,
    timeout: Duration,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("backend", &self.backend)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a new client for `model`.
    ///
    /// # Errors
    ///
    /// Returns an error if the model name is empty or whitespace-only, or if
    /// the HTTP client fails to build.
    pub fn new(
        backend: Backend,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(LlmError::InvalidModel {
                reason: "model name cannot be empty",
            });
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(LlmError::ClientBuild)?;

        Ok(Self {
            http,
            backend,
            model,
            timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub const fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Sends a raw prompt and returns the trimmed model output.
    pub async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "calling model");
        let text = match &self.backend {
            Backend::Process { program } => self.run_process(program, prompt).await?,
            Backend::Http { host } => self.post_generate(host, prompt).await?,
        };
        Ok(text.trim().to_string())
    }

    async fn run_process(&self, program: &str, prompt: &str) -> Result<String, LlmError> {
        let mut command = Command::new(program);
        command.arg("run").arg(&self.model).arg(prompt).kill_on_drop(true);
        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| LlmError::Timeout(self.timeout))?
            .map_err(|source| LlmError::Spawn {
                program: program.to_string(),
                source,
            })?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stderr).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stdout));
            tracing::warn!(program, status = %output.status, "model runner failed");
            return Err(LlmError::Process {
                program: program.to_string(),
                status: output.status.to_string(),
                output: combined.trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn post_generate(&self, host: &str, prompt: &str) -> Result<String, LlmError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };
        let response = self
            .http
            .post(endpoint(host, "api/generate"))
            .json(&request)
            .send()
            .await
            .map_err(|err| self.map_request_error(err))?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(parse_api_error(&body).unwrap_or_else(|| LlmError::Api {
                message: format!("status {status}: {body}"),
            }));
        }

        let payload: GenerateResponse = serde_json::from_str(&body)
            .map_err(|err| LlmError::InvalidResponse(err.to_string()))?;
        Ok(payload.response)
    }

    fn map_request_error(&self, err: reqwest::Error) -> LlmError {
        if err.is_timeout() {
            LlmError::Timeout(self.timeout)
        } else {
            LlmError::Request(err)
        }
    }

    /// Checks that the backend answers: `<program> list` exits cleanly, or
    /// `GET <host>/api/tags` succeeds.
    pub async fn is_available(&self) -> bool {
        match &self.backend {
            Backend::Process { program } => {
                let mut command = Command::new(program);
                command.arg("list").kill_on_drop(true);
                match tokio::time::timeout(self.timeout, command.output()).await {
                    Ok(Ok(output)) => output.status.success(),
                    Ok(Err(err)) => {
                        tracing::debug!(program, %err, "model runner not found");
                        false
                    }
                    Err(_) => false,
                }
            }
            Backend::Http { host } => match self.http.get(endpoint(host, "api/tags")).send().await
            {
                Ok(response) => response.status().is_success(),
                Err(err) => {
                    tracing::debug!(host, %err, "model server unreachable");
                    false
                }
            },
        }
    }

    /// Parses a free-text description of work into entry fields.
    pub async fn parse_entry(&self, input: &str) -> Result<ParsedEntry, LlmError> {
        let prompt = build_parse_prompt(input, Utc::now());
        let text = self.generate(&prompt).await?;
        parse_entry_response(&text)
    }

    /// Summarizes a block and its entries for a client.
    pub async fn summarize_block<E: EntryRef>(
        &self,
        block: &Block,
        entries: &[E],
    ) -> Result<String, LlmError> {
        self.generate(&build_block_summary_prompt(block, entries))
            .await
    }

    /// Short feedback after logging `entry`, with block progress when known.
    pub async fn feedback_after_entry<E: EntryRef>(
        &self,
        entry: &Entry,
        entries: &[E],
        block: Option<&Block>,
    ) -> Result<String, LlmError> {
        self.generate(&build_feedback_prompt(entry, entries, block))
            .await
    }

    /// Answers a question about the tracked data.
    pub async fn answer_query<E: EntryRef>(
        &self,
        question: &str,
        entries: &[E],
        blocks: &[Block],
    ) -> Result<String, LlmError> {
        self.generate(&build_query_prompt(question, entries, blocks))
            .await
    }

    /// Suggests the next likely entry.
    pub async fn suggest_next_entry<E: EntryRef>(
        &self,
        entries: &[E],
        blocks: &[Block],
    ) -> Result<String, LlmError> {
        self.generate(&build_suggest_prompt(entries, blocks)).await
    }

    /// Produces a reminder or nudge based on recent activity.
    pub async fn smart_reminder<E: EntryRef>(
        &self,
        entries: &[E],
        blocks: &[Block],
    ) -> Result<String, LlmError> {
        self.generate(&build_reminder_prompt(entries, blocks)).await
    }

    /// Completes a partial project, client or task name.
    pub async fn autocomplete<E: EntryRef>(
        &self,
        partial: &str,
        entries: &[E],
        blocks: &[Block],
    ) -> Result<String, LlmError> {
        self.generate(&build_autocomplete_prompt(partial, entries, blocks))
            .await
    }

    /// Writes a short review of a period from per-project hours.
    pub async fn review_summary(
        &self,
        period: &str,
        totals: &[(String, f64)],
    ) -> Result<String, LlmError> {
        self.generate(&build_review_prompt(period, totals)).await
    }
}

/// Entry fields extracted from free text by the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedEntry {
    pub summary: String,
    pub project: Option<String>,
    pub client: Option<String>,
    pub task: Option<String>,
    pub duration_minutes: Option<i64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl ParsedEntry {
    /// `task: summary` when a task was recognised, else the summary alone.
    pub fn display_summary(&self) -> String {
        match self.task.as_deref().map(str::trim) {
            Some(task) if !task.is_empty() && !self.summary.is_empty() => {
                format!("{task}: {}", self.summary)
            }
            Some(task) if !task.is_empty() => task.to_string(),
            _ => self.summary.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

fn endpoint(host: &str, path: &str) -> String {
    format!("{}/{path}", host.trim_end_matches('/'))
}

fn parse_api_error(body: &str) -> Option<LlmError> {
    #[derive(Deserialize)]
    struct ErrorPayload {
        error: String,
    }

    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .map(|payload| LlmError::Api {
            message: payload.error,
        })
}

// ========== Prompts ==========

fn build_parse_prompt(input: &str, now: DateTime<Utc>) -> String {
    let mut lines = Vec::new();
    lines.push("Parse the following time tracking entry.".to_string());
    lines.push(
        "Return strict JSON with these fields: project, client, task, description, \
         duration (in minutes), start_time (RFC3339), end_time (RFC3339)."
            .to_string(),
    );
    lines.push("Omit fields that are not mentioned.".to_string());
    lines.push(format!("current_time: {}", now.to_rfc3339()));
    lines.push(format!("Input: \"{input}\""));
    lines.join("\n")
}

fn build_block_summary_prompt<E: EntryRef>(block: &Block, entries: &[E]) -> String {
    let mut prompt = format!(
        "Summarize the following work block for a client. Block: {} ({} / {}, {} to {})\n",
        block.name,
        block.client,
        block.project,
        block.start_time.format("%Y-%m-%d"),
        block.end_time.format("%Y-%m-%d"),
    );
    prompt.push_str(&render_entries(entries));
    prompt
}

fn build_feedback_prompt<E: EntryRef>(
    entry: &Entry,
    entries: &[E],
    block: Option<&Block>,
) -> String {
    let logged: f64 = entries
        .iter()
        .filter_map(EntryRef::entry)
        .map(Entry::minutes)
        .sum();
    let mut prompt = format!(
        "You are a time tracking assistant. The user just logged a new entry: '{}' ({}).\n",
        entry.summary,
        format_minutes(entry.minutes()),
    );
    let _ = write!(
        prompt,
        "Total time logged in this block: {:.2} hours.",
        logged / 60.0
    );
    if let Some(block) = block {
        if let Some(progress) = block.progress_percent(logged) {
            let _ = write!(prompt, " Progress: {progress:.1}%.");
        }
        let _ = write!(prompt, " Block ends: {}.", block.end_time.format("%Y-%m-%d"));
        prompt.push_str(" Warn if over or under target and suggest balancing if needed.");
    }
    prompt.push_str(" Give a concise, friendly feedback message.");
    prompt
}

fn build_query_prompt<E: EntryRef>(question: &str, entries: &[E], blocks: &[Block]) -> String {
    format!(
        "You are a time tracking assistant. The user asked: '{question}'.\n\
         Here are the user's blocks and entries:\n{}\
         Answer concisely and helpfully.",
        render_context(entries, blocks)
    )
}

fn build_suggest_prompt<E: EntryRef>(entries: &[E], blocks: &[Block]) -> String {
    format!(
        "Based on the user's recent time entries and active block, suggest the next likely \
         task or entry. Be concise.\n{}",
        render_context(entries, blocks)
    )
}

fn build_reminder_prompt<E: EntryRef>(entries: &[E], blocks: &[Block]) -> String {
    format!(
        "You are a time tracking assistant. Based on the user's recent entries and blocks, \
         suggest a smart reminder or nudge (log time, resume a block, review a sprint). \
         Be concise.\n{}",
        render_context(entries, blocks)
    )
}

fn build_autocomplete_prompt<E: EntryRef>(
    partial: &str,
    entries: &[E],
    blocks: &[Block],
) -> String {
    format!(
        "Suggest auto-completions for this partial input (project/client/task): '{partial}'.\n{}",
        render_context(entries, blocks)
    )
}

fn build_review_prompt(period: &str, totals: &[(String, f64)]) -> String {
    let mut prompt = format!(
        "Write a short review of the user's {period}. Hours logged per project:\n"
    );
    for (project, hours) in totals {
        let _ = writeln!(prompt, "- {project}: {hours:.2}h");
    }
    prompt.push_str("Highlight where the time went and anything worth rebalancing.");
    prompt
}

fn render_context<E: EntryRef>(entries: &[E], blocks: &[Block]) -> String {
    let mut out = String::from("Blocks:\n");
    if blocks.is_empty() {
        out.push_str("(none)\n");
    }
    for block in blocks {
        let _ = writeln!(
            out,
            "- {} [{}{}] client={} project={} {} to {}",
            block.name,
            block.id,
            if block.active { ", active" } else { "" },
            block.client,
            block.project,
            block.start_time.format("%Y-%m-%d"),
            block.end_time.format("%Y-%m-%d"),
        );
    }
    out.push_str("Entries:\n");
    out.push_str(&render_entries(entries));
    out
}

fn render_entries<E: EntryRef>(entries: &[E]) -> String {
    let mut out = String::new();
    let present: Vec<&Entry> = entries.iter().filter_map(EntryRef::entry).collect();
    if present.is_empty() {
        out.push_str("(none)\n");
    }
    for entry in present.iter().take(CONTEXT_ENTRY_LIMIT) {
        let start = entry
            .start_time
            .map_or_else(|| "unknown".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
        let project = entry
            .project_id
            .map_or_else(|| "none".to_string(), |id| id.to_string());
        let _ = writeln!(
            out,
            "- {start} project={project} {} ({})",
            entry.summary,
            format_minutes(entry.minutes())
        );
    }
    out
}

// ========== Response parsing ==========

/// Returns the first balanced `{...}` object in `text`, skipping braces inside strings.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_entry_response(text: &str) -> Result<ParsedEntry, LlmError> {
    #[derive(Deserialize)]
    struct Payload {
        summary: Option<String>,
        description: Option<String>,
        project: Option<String>,
        client: Option<String>,
        task: Option<String>,
        duration: Option<serde_json::Value>,
        start_time: Option<String>,
        entry_time: Option<String>,
        end_time: Option<String>,
    }

    let json = extract_json_object(text)
        .ok_or_else(|| LlmError::InvalidResponse(format!("no JSON object in: {text}")))?;
    let payload: Payload =
        serde_json::from_str(json).map_err(|err| LlmError::InvalidResponse(err.to_string()))?;

    let summary = payload
        .summary
        .or(payload.description)
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    Ok(ParsedEntry {
        summary,
        project: non_empty(payload.project),
        client: non_empty(payload.client),
        task: non_empty(payload.task),
        duration_minutes: payload.duration.as_ref().and_then(duration_from_value),
        start_time: payload
            .start_time
            .or(payload.entry_time)
            .as_deref()
            .and_then(parse_time),
        end_time: payload.end_time.as_deref().and_then(parse_time),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Reads a model-reported duration in whole minutes.
///
/// Numbers are minutes. Strings go through [`parse_duration`] after unit
/// words are shortened, so `"2h"`, `"90"` and `"1 hour 30 minutes"` all
/// parse. Values that do not fit a [`chrono::Duration`] are dropped.
#[allow(clippy::cast_possible_truncation)]
fn duration_from_value(value: &serde_json::Value) -> Option<i64> {
    let minutes = match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64)),
        serde_json::Value::String(s) => match parse_duration(&compact_units(s)) {
            Ok(duration) => Some(duration.num_minutes()),
            Err(err) => {
                tracing::debug!(value = %s, %err, "ignoring unparseable model duration");
                None
            }
        },
        _ => None,
    };
    minutes.filter(|minutes| *minutes > 0 && chrono::Duration::try_minutes(*minutes).is_some())
}

/// Turns `"1 hour 30 minutes"` into `"1h30m"`: whitespace is dropped and each
/// word is cut to its first letter.
fn compact_units(text: &str) -> String {
    let mut compact = String::with_capacity(text.len());
    let mut in_word = false;
    for c in text.trim().chars() {
        if c.is_alphabetic() {
            if !in_word {
                compact.extend(c.to_lowercase());
            }
            in_word = true;
        } else {
            in_word = false;
            if !c.is_whitespace() {
                compact.push(c);
            }
        }
    }
    compact
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(value.trim()) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(err) => {
            tracing::debug!(value, %err, "ignoring unparseable model timestamp");
            None
        }
    }
}
