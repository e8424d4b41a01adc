//! Storage layer for the chronos time tracker.
//!
//! Provides persistence for entries, blocks, projects, clients, templates and
//! query history using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! The CLI is single-process and synchronous, so one `Database` per invocation is enough.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 format with millisecond precision
//! (e.g., `2024-01-15T10:30:00.000Z`), so lexicographic ordering matches
//! chronological ordering. Entry start and end times are nullable; NULL means
//! the bound was never recorded.
//!
//! A stored entry time that fails to parse is logged and read back as absent
//! rather than failing the whole query, since analytics must keep working on
//! messy rows.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use chronos_core::{Block, Client, Entry, Project, sanitize_description, sanitize_name};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use thiserror::Error;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A row addressed by ID does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },
    /// Failed to parse a required timestamp column.
    #[error("invalid timestamp in {table} row {id}: {timestamp}")]
    TimestampParse {
        table: &'static str,
        id: i64,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// An entry ready to be stored. IDs and bookkeeping timestamps are assigned on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub block_id: Option<i64>,
    pub project_id: Option<i64>,
    pub summary: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub billable: bool,
}

/// A block ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBlock {
    pub name: String,
    pub client: String,
    pub project: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// A project ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProject {
    pub name: String,
    pub client_id: Option<i64>,
    pub rate: f64,
}

/// Filters for [`Database::list_entries`]. Unset fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub block_id: Option<i64>,
    pub project_id: Option<i64>,
    pub invoiced: Option<bool>,
    pub billable: Option<bool>,
    /// Inclusive lower bound on start time.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on start time.
    pub to: Option<DateTime<Utc>>,
}

/// Filters for [`Database::list_blocks`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockFilter {
    pub client: Option<String>,
    pub project: Option<String>,
}

const ENTRY_COLUMNS: &str = "id, block_id, project_id, summary, start_time, end_time, created_at, updated_at, billable, invoiced";
const BLOCK_COLUMNS: &str = "id, name, client, project, start_time, end_time, active, created_at";
const PROJECT_COLUMNS: &str = "id, name, client_id, rate, created_at, updated_at";
const CLIENT_COLUMNS: &str = "id, name, contact_info, created_at, updated_at";

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS clients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                contact_info TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                client_id INTEGER,
                rate REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (client_id) REFERENCES clients(id) ON DELETE SET NULL
            );

            CREATE INDEX IF NOT EXISTS idx_projects_name ON projects(name);

            CREATE TABLE IF NOT EXISTS blocks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                client TEXT NOT NULL DEFAULT '',
                project TEXT NOT NULL DEFAULT '',
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_blocks_active ON blocks(active);

            -- start_time / end_time: RFC 3339 or NULL when never recorded
            CREATE TABLE IF NOT EXISTS entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                block_id INTEGER,
                project_id INTEGER,
                summary TEXT NOT NULL DEFAULT '',
                start_time TEXT,
                end_time TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                billable INTEGER NOT NULL DEFAULT 1,
                invoiced INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (block_id) REFERENCES blocks(id) ON DELETE SET NULL,
                FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE SET NULL
            );

            CREATE INDEX IF NOT EXISTS idx_entries_start ON entries(start_time);
            CREATE INDEX IF NOT EXISTS idx_entries_block ON entries(block_id);
            CREATE INDEX IF NOT EXISTS idx_entries_project ON entries(project_id);

            CREATE TABLE IF NOT EXISTS templates (
                name TEXT PRIMARY KEY,
                entry TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS query_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                query TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    // ========== Entries ==========

    /// Inserts an entry and returns it with its assigned ID.
    pub fn create_entry(&self, entry: &NewEntry) -> Result<Entry, DbError> {
        let now = Utc::now();
        let summary = sanitize_description(&entry.summary);
        self.conn.execute(
            "
            INSERT INTO entries
            (block_id, project_id, summary, start_time, end_time, created_at, updated_at, billable, invoiced)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)
            ",
            params![
                entry.block_id,
                entry.project_id,
                summary,
                entry.start_time.map(format_timestamp),
                entry.end_time.map(format_timestamp),
                format_timestamp(now),
                format_timestamp(now),
                entry.billable,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::debug!(id, "created entry");
        self.get_entry(id)?
            .ok_or(DbError::NotFound { kind: "entry", id })
    }

    /// Fetches an entry by ID.
    pub fn get_entry(&self, id: i64) -> Result<Option<Entry>, DbError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?"),
                [id],
                EntryRow::from_row,
            )
            .optional()?;
        row.map(EntryRow::into_entry).transpose()
    }

    /// Writes every field of `entry` back and bumps its `updated_at`.
    pub fn update_entry(&self, entry: &mut Entry) -> Result<(), DbError> {
        entry.summary = sanitize_description(&entry.summary);
        entry.updated_at = Utc::now();
        let changed = self.conn.execute(
            "
            UPDATE entries
            SET block_id = ?, project_id = ?, summary = ?, start_time = ?, end_time = ?,
                updated_at = ?, billable = ?, invoiced = ?
            WHERE id = ?
            ",
            params![
                entry.block_id,
                entry.project_id,
                entry.summary,
                entry.start_time.map(format_timestamp),
                entry.end_time.map(format_timestamp),
                format_timestamp(entry.updated_at),
                entry.billable,
                entry.invoiced,
                entry.id,
            ],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound {
                kind: "entry",
                id: entry.id,
            });
        }
        Ok(())
    }

    /// Deletes an entry by ID.
    pub fn delete_entry(&self, id: i64) -> Result<(), DbError> {
        let changed = self.conn.execute("DELETE FROM entries WHERE id = ?", [id])?;
        if changed == 0 {
            return Err(DbError::NotFound { kind: "entry", id });
        }
        Ok(())
    }

    /// Lists entries matching `filter`, most recent start first.
    ///
    /// Entries without a start time come last.
    pub fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<Entry>, DbError> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(block_id) = filter.block_id {
            clauses.push("block_id = ?");
            values.push(Value::Integer(block_id));
        }
        if let Some(project_id) = filter.project_id {
            clauses.push("project_id = ?");
            values.push(Value::Integer(project_id));
        }
        if let Some(invoiced) = filter.invoiced {
            clauses.push("invoiced = ?");
            values.push(Value::Integer(i64::from(invoiced)));
        }
        if let Some(billable) = filter.billable {
            clauses.push("billable = ?");
            values.push(Value::Integer(i64::from(billable)));
        }
        if let Some(from) = filter.from {
            clauses.push("start_time >= ?");
            values.push(Value::Text(format_timestamp(from)));
        }
        if let Some(to) = filter.to {
            clauses.push("start_time <= ?");
            values.push(Value::Text(format_timestamp(to)));
        }

        let mut sql = format!("SELECT {ENTRY_COLUMNS} FROM entries");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY start_time IS NULL ASC, start_time DESC, id DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), EntryRow::from_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_entry()?);
        }
        Ok(entries)
    }

    /// Marks the given entries as invoiced in one transaction.
    ///
    /// Returns the number of entries changed; unknown IDs are ignored.
    pub fn mark_entries_invoiced(&mut self, ids: &[i64]) -> Result<usize, DbError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let updated_at = format_timestamp(Utc::now());
        let tx = self.conn.transaction()?;
        let mut changed = 0;
        {
            let mut stmt =
                tx.prepare("UPDATE entries SET invoiced = 1, updated_at = ? WHERE id = ?")?;
            for id in ids {
                changed += stmt.execute(params![updated_at, id])?;
            }
        }
        tx.commit()?;
        Ok(changed)
    }

    /// Lists billable entries that have not been invoiced yet.
    pub fn unbilled_entries(&self) -> Result<Vec<Entry>, DbError> {
        self.list_entries(&EntryFilter {
            billable: Some(true),
            invoiced: Some(false),
            ..EntryFilter::default()
        })
    }

    // ========== Blocks ==========

    /// Inserts a block and makes it the only active one.
    pub fn create_block(&mut self, block: &NewBlock) -> Result<Block, DbError> {
        let now = format_timestamp(Utc::now());
        let tx = self.conn.transaction()?;
        tx.execute("UPDATE blocks SET active = 0 WHERE active = 1", [])?;
        tx.execute(
            "
            INSERT INTO blocks (name, client, project, start_time, end_time, active, created_at)
            VALUES (?, ?, ?, ?, ?, 1, ?)
            ",
            params![
                sanitize_name(&block.name),
                sanitize_name(&block.client),
                sanitize_name(&block.project),
                format_timestamp(block.start_time),
                format_timestamp(block.end_time),
                now,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        tracing::debug!(id, "created active block");
        self.get_block(id)?
            .ok_or(DbError::NotFound { kind: "block", id })
    }

    /// Fetches a block by ID.
    pub fn get_block(&self, id: i64) -> Result<Option<Block>, DbError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {BLOCK_COLUMNS} FROM blocks WHERE id = ?"),
                [id],
                BlockRow::from_row,
            )
            .optional()?;
        row.map(BlockRow::into_block).transpose()
    }

    /// Lists blocks, newest start first.
    pub fn list_blocks(&self, filter: &BlockFilter) -> Result<Vec<Block>, DbError> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(client) = &filter.client {
            clauses.push("client = ?");
            values.push(Value::Text(client.clone()));
        }
        if let Some(project) = &filter.project {
            clauses.push("project = ?");
            values.push(Value::Text(project.clone()));
        }

        let mut sql = format!("SELECT {BLOCK_COLUMNS} FROM blocks");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY start_time DESC, id DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), BlockRow::from_row)?;
        let mut blocks = Vec::new();
        for row in rows {
            blocks.push(row?.into_block()?);
        }
        Ok(blocks)
    }

    /// Returns the active block, if any.
    pub fn active_block(&self) -> Result<Option<Block>, DbError> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {BLOCK_COLUMNS} FROM blocks WHERE active = 1 ORDER BY id DESC LIMIT 1"
                ),
                [],
                BlockRow::from_row,
            )
            .optional()?;
        row.map(BlockRow::into_block).transpose()
    }

    /// Makes `id` the only active block.
    pub fn set_active_block(&self, id: i64) -> Result<(), DbError> {
        if self.get_block(id)?.is_none() {
            return Err(DbError::NotFound { kind: "block", id });
        }
        self.conn
            .execute("UPDATE blocks SET active = (id = ?)", [id])?;
        Ok(())
    }

    /// Deletes a block. Its entries keep existing without a block.
    pub fn delete_block(&self, id: i64) -> Result<(), DbError> {
        let changed = self.conn.execute("DELETE FROM blocks WHERE id = ?", [id])?;
        if changed == 0 {
            return Err(DbError::NotFound { kind: "block", id });
        }
        Ok(())
    }

    // ========== Projects ==========

    /// Inserts a project and returns it with its assigned ID.
    pub fn create_project(&self, project: &NewProject) -> Result<Project, DbError> {
        let now = format_timestamp(Utc::now());
        self.conn.execute(
            "
            INSERT INTO projects (name, client_id, rate, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ",
            params![
                sanitize_name(&project.name),
                project.client_id,
                project.rate,
                now,
                now
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_project(id)?
            .ok_or(DbError::NotFound { kind: "project", id })
    }

    /// Fetches a project by ID.
    pub fn get_project(&self, id: i64) -> Result<Option<Project>, DbError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?"),
                [id],
                ProjectRow::from_row,
            )
            .optional()?;
        row.map(ProjectRow::into_project).transpose()
    }

    /// Finds a project by name, ignoring ASCII case. The oldest match wins.
    pub fn find_project_by_name(&self, name: &str) -> Result<Option<Project>, DbError> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {PROJECT_COLUMNS} FROM projects WHERE name = ? COLLATE NOCASE ORDER BY id ASC LIMIT 1"
                ),
                [sanitize_name(name)],
                ProjectRow::from_row,
            )
            .optional()?;
        row.map(ProjectRow::into_project).transpose()
    }

    /// Writes a project back and bumps its `updated_at`.
    pub fn update_project(&self, project: &mut Project) -> Result<(), DbError> {
        project.name = sanitize_name(&project.name);
        project.updated_at = Utc::now();
        let changed = self.conn.execute(
            "UPDATE projects SET name = ?, client_id = ?, rate = ?, updated_at = ? WHERE id = ?",
            params![
                project.name,
                project.client_id,
                project.rate,
                format_timestamp(project.updated_at),
                project.id,
            ],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound {
                kind: "project",
                id: project.id,
            });
        }
        Ok(())
    }

    /// Deletes a project. Entries referencing it lose their project.
    pub fn delete_project(&self, id: i64) -> Result<(), DbError> {
        let changed = self
            .conn
            .execute("DELETE FROM projects WHERE id = ?", [id])?;
        if changed == 0 {
            return Err(DbError::NotFound {
                kind: "project",
                id,
            });
        }
        Ok(())
    }

    /// Lists projects by name, optionally restricted to one client.
    pub fn list_projects(&self, client_id: Option<i64>) -> Result<Vec<Project>, DbError> {
        let (sql, values) = client_id.map_or_else(
            || {
                (
                    format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY name ASC, id ASC"),
                    Vec::new(),
                )
            },
            |client_id| {
                (
                    format!(
                        "SELECT {PROJECT_COLUMNS} FROM projects WHERE client_id = ? ORDER BY name ASC, id ASC"
                    ),
                    vec![Value::Integer(client_id)],
                )
            },
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), ProjectRow::from_row)?;
        let mut projects = Vec::new();
        for row in rows {
            projects.push(row?.into_project()?);
        }
        Ok(projects)
    }

    /// Returns the hourly rate of every project.
    pub fn project_rates(&self) -> Result<HashMap<i64, f64>, DbError> {
        let mut stmt = self.conn.prepare("SELECT id, rate FROM projects")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?)))?;
        let mut rates = HashMap::new();
        for row in rows {
            let (id, rate) = row?;
            rates.insert(id, rate);
        }
        Ok(rates)
    }

    // ========== Clients ==========

    /// Inserts a client and returns it with its assigned ID.
    pub fn create_client(&self, name: &str, contact_info: &str) -> Result<Client, DbError> {
        let now = format_timestamp(Utc::now());
        self.conn.execute(
            "INSERT INTO clients (name, contact_info, created_at, updated_at) VALUES (?, ?, ?, ?)",
            params![sanitize_name(name), sanitize_description(contact_info), now, now],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_client(id)?
            .ok_or(DbError::NotFound { kind: "client", id })
    }

    /// Fetches a client by ID.
    pub fn get_client(&self, id: i64) -> Result<Option<Client>, DbError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = ?"),
                [id],
                ClientRow::from_row,
            )
            .optional()?;
        row.map(ClientRow::into_client).transpose()
    }

    /// Finds a client by name, ignoring ASCII case.
    pub fn find_client_by_name(&self, name: &str) -> Result<Option<Client>, DbError> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {CLIENT_COLUMNS} FROM clients WHERE name = ? COLLATE NOCASE ORDER BY id ASC LIMIT 1"
                ),
                [sanitize_name(name)],
                ClientRow::from_row,
            )
            .optional()?;
        row.map(ClientRow::into_client).transpose()
    }

    /// Writes a client back and bumps its `updated_at`.
    pub fn update_client(&self, client: &mut Client) -> Result<(), DbError> {
        client.name = sanitize_name(&client.name);
        client.updated_at = Utc::now();
        let changed = self.conn.execute(
            "UPDATE clients SET name = ?, contact_info = ?, updated_at = ? WHERE id = ?",
            params![
                client.name,
                client.contact_info,
                format_timestamp(client.updated_at),
                client.id,
            ],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound {
                kind: "client",
                id: client.id,
            });
        }
        Ok(())
    }

    /// Deletes a client. Its projects keep existing without a client.
    pub fn delete_client(&self, id: i64) -> Result<(), DbError> {
        let changed = self.conn.execute("DELETE FROM clients WHERE id = ?", [id])?;
        if changed == 0 {
            return Err(DbError::NotFound { kind: "client", id });
        }
        Ok(())
    }

    /// Lists clients by name.
    pub fn list_clients(&self) -> Result<Vec<Client>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients ORDER BY name ASC, id ASC"
        ))?;
        let rows = stmt.query_map([], ClientRow::from_row)?;
        let mut clients = Vec::new();
        for row in rows {
            clients.push(row?.into_client()?);
        }
        Ok(clients)
    }

    // ========== Templates ==========

    /// Saves or replaces an entry template.
    pub fn save_template(&self, name: &str, entry_text: &str) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO templates (name, entry) VALUES (?, ?)",
            params![name, entry_text],
        )?;
        Ok(())
    }

    /// Fetches a template's text by name.
    pub fn get_template(&self, name: &str) -> Result<Option<String>, DbError> {
        Ok(self
            .conn
            .query_row("SELECT entry FROM templates WHERE name = ?", [name], |row| {
                row.get(0)
            })
            .optional()?)
    }

    /// Lists all templates as `(name, text)` pairs, ordered by name.
    pub fn list_templates(&self) -> Result<Vec<(String, String)>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, entry FROM templates ORDER BY name ASC")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut templates = Vec::new();
        for row in rows {
            templates.push(row?);
        }
        Ok(templates)
    }

    // ========== Query History ==========

    /// Records a natural-language query.
    pub fn save_query(&self, query: &str) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO query_history (query, created_at) VALUES (?, ?)",
            params![query, format_timestamp(Utc::now())],
        )?;
        Ok(())
    }

    /// Returns up to `limit` recent queries, newest first.
    pub fn query_history(&self, limit: usize) -> Result<Vec<String>, DbError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(
            "SELECT query FROM query_history ORDER BY created_at DESC, id DESC LIMIT ?",
        )?;
        let rows = stmt.query_map([limit], |row| row.get(0))?;
        let mut queries = Vec::new();
        for row in rows {
            queries.push(row?);
        }
        Ok(queries)
    }
}

// ========== Row Mapping ==========

struct EntryRow {
    id: i64,
    block_id: Option<i64>,
    project_id: Option<i64>,
    summary: String,
    start_time: Option<String>,
    end_time: Option<String>,
    created_at: String,
    updated_at: String,
    billable: bool,
    invoiced: bool,
}

impl EntryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            block_id: row.get(1)?,
            project_id: row.get(2)?,
            summary: row.get(3)?,
            start_time: row.get(4)?,
            end_time: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
            billable: row.get(8)?,
            invoiced: row.get(9)?,
        })
    }

    fn into_entry(self) -> Result<Entry, DbError> {
        Ok(Entry {
            start_time: parse_optional_timestamp(self.start_time.as_deref(), self.id),
            end_time: parse_optional_timestamp(self.end_time.as_deref(), self.id),
            created_at: parse_timestamp(&self.created_at, "entries", self.id)?,
            updated_at: parse_timestamp(&self.updated_at, "entries", self.id)?,
            id: self.id,
            block_id: self.block_id,
            project_id: self.project_id,
            summary: self.summary,
            billable: self.billable,
            invoiced: self.invoiced,
        })
    }
}

struct BlockRow {
    id: i64,
    name: String,
    client: String,
    project: String,
    start_time: String,
    end_time: String,
    active: bool,
    created_at: String,
}

impl BlockRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            client: row.get(2)?,
            project: row.get(3)?,
            start_time: row.get(4)?,
            end_time: row.get(5)?,
            active: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn into_block(self) -> Result<Block, DbError> {
        Ok(Block {
            start_time: parse_timestamp(&self.start_time, "blocks", self.id)?,
            end_time: parse_timestamp(&self.end_time, "blocks", self.id)?,
            created_at: parse_timestamp(&self.created_at, "blocks", self.id)?,
            id: self.id,
            name: self.name,
            client: self.client,
            project: self.project,
            active: self.active,
        })
    }
}

struct ProjectRow {
    id: i64,
    name: String,
    client_id: Option<i64>,
    rate: f64,
    created_at: String,
    updated_at: String,
}

impl ProjectRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            client_id: row.get(2)?,
            rate: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn into_project(self) -> Result<Project, DbError> {
        Ok(Project {
            created_at: parse_timestamp(&self.created_at, "projects", self.id)?,
            updated_at: parse_timestamp(&self.updated_at, "projects", self.id)?,
            id: self.id,
            name: self.name,
            client_id: self.client_id,
            rate: self.rate,
        })
    }
}

struct ClientRow {
    id: i64,
    name: String,
    contact_info: String,
    created_at: String,
    updated_at: String,
}

impl ClientRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            contact_info: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    fn into_client(self) -> Result<Client, DbError> {
        Ok(Client {
            created_at: parse_timestamp(&self.created_at, "clients", self.id)?,
            updated_at: parse_timestamp(&self.updated_at, "clients", self.id)?,
            id: self.id,
            name: self.name,
            contact_info: self.contact_info,
        })
    }
}

fn parse_timestamp(timestamp: &str, table: &'static str, id: i64) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            table,
            id,
            timestamp: timestamp.to_string(),
            source,
        })
}

fn parse_optional_timestamp(timestamp: Option<&str>, entry_id: i64) -> Option<DateTime<Utc>> {
    let timestamp = timestamp?;
    match DateTime::parse_from_rfc3339(timestamp) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(err) => {
            tracing::warn!(entry_id, timestamp, %err, "unparseable entry time, treating as absent");
            None
        }
    }
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use chrono::{Duration, TimeZone};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 7, hour, minute, 0).unwrap()
    }

    fn new_entry(summary: &str, start: Option<DateTime<Utc>>, minutes: i64) -> NewEntry {
        NewEntry {
            block_id: None,
            project_id: None,
            summary: summary.to_string(),
            start_time: start,
            end_time: start.map(|s| s + Duration::minutes(minutes)),
            billable: true,
        }
    }

    fn new_block(name: &str) -> NewBlock {
        NewBlock {
            name: name.to_string(),
            client: "Acme".to_string(),
            project: "Apollo".to_string(),
            start_time: at(0, 0),
            end_time: at(0, 0) + Duration::weeks(2),
        }
    }

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn open_is_idempotent_on_disk() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("chronos.db");
        {
            let db = Database::open(&path).unwrap();
            db.create_entry(&new_entry("first", Some(at(9, 0)), 30))
                .unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.list_entries(&EntryFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn schema_matches_data_model() {
        let db = Database::open_in_memory().expect("open in-memory db");

        assert_eq!(
            table_columns(&db.conn, "entries"),
            vec![
                "id",
                "block_id",
                "project_id",
                "summary",
                "start_time",
                "end_time",
                "created_at",
                "updated_at",
                "billable",
                "invoiced",
            ]
        );
        assert_eq!(
            table_columns(&db.conn, "blocks"),
            vec![
                "id",
                "name",
                "client",
                "project",
                "start_time",
                "end_time",
                "active",
                "created_at",
            ]
        );
        assert_eq!(
            table_columns(&db.conn, "projects"),
            vec!["id", "name", "client_id", "rate", "created_at", "updated_at"]
        );
        assert_eq!(
            table_columns(&db.conn, "clients"),
            vec!["id", "name", "contact_info", "created_at", "updated_at"]
        );
        assert_eq!(table_columns(&db.conn, "templates"), vec!["name", "entry"]);
        assert_eq!(
            table_columns(&db.conn, "query_history"),
            vec!["id", "query", "created_at"]
        );

        let entry_indexes = index_names(&db.conn, "entries");
        let expected: HashSet<String> = [
            "idx_entries_start",
            "idx_entries_block",
            "idx_entries_project",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        assert!(expected.is_subset(&entry_indexes));
    }

    fn table_columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .expect("prepare table_info");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query table_info");
        rows.map(|row| row.expect("table_info row")).collect()
    }

    fn index_names(conn: &Connection, table: &str) -> HashSet<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA index_list({table})"))
            .expect("prepare index_list");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query index_list");
        rows.map(|row| row.expect("index_list row")).collect()
    }

    #[test]
    fn create_and_get_entry_round_trips_fields() {
        let db = Database::open_in_memory().unwrap();
        let created = db
            .create_entry(&new_entry("Coding: parser\nrewrite", Some(at(9, 0)), 45))
            .unwrap();

        let fetched = db.get_entry(created.id).unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.summary, "Coding: parser rewrite");
        assert_eq!(fetched.start_time, Some(at(9, 0)));
        assert_eq!(fetched.end_time, Some(at(9, 45)));
        assert!(fetched.billable);
        assert!(!fetched.invoiced);
    }

    #[test]
    fn entries_without_times_are_stored_as_null() {
        let db = Database::open_in_memory().unwrap();
        let created = db.create_entry(&new_entry("someday", None, 0)).unwrap();
        assert!(created.start_time.is_none());
        assert!(created.end_time.is_none());
    }

    #[test]
    fn get_missing_entry_is_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_entry(42).unwrap().is_none());
    }

    #[test]
    fn update_entry_persists_changes() {
        let db = Database::open_in_memory().unwrap();
        let mut entry = db
            .create_entry(&new_entry("Review", Some(at(9, 0)), 30))
            .unwrap();
        entry.invoiced = true;
        entry.summary = "Review PR".to_string();
        entry.end_time = Some(at(10, 0));
        db.update_entry(&mut entry).unwrap();

        let fetched = db.get_entry(entry.id).unwrap().unwrap();
        assert!(fetched.invoiced);
        assert_eq!(fetched.summary, "Review PR");
        assert_eq!(fetched.end_time, Some(at(10, 0)));
    }

    #[test]
    fn update_and_delete_missing_entry_fail() {
        let db = Database::open_in_memory().unwrap();
        let mut entry = db
            .create_entry(&new_entry("Gone", Some(at(9, 0)), 30))
            .unwrap();
        db.delete_entry(entry.id).unwrap();

        assert!(matches!(
            db.delete_entry(entry.id),
            Err(DbError::NotFound { kind: "entry", .. })
        ));
        assert!(matches!(
            db.update_entry(&mut entry),
            Err(DbError::NotFound { kind: "entry", .. })
        ));
    }

    #[test]
    fn list_entries_orders_recent_first_with_unstarted_last() {
        let db = Database::open_in_memory().unwrap();
        let early = db.create_entry(&new_entry("early", Some(at(8, 0)), 30)).unwrap();
        let none = db.create_entry(&new_entry("none", None, 0)).unwrap();
        let late = db.create_entry(&new_entry("late", Some(at(14, 0)), 30)).unwrap();

        let ids: Vec<i64> = db
            .list_entries(&EntryFilter::default())
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();

        assert_eq!(ids, vec![late.id, early.id, none.id]);
    }

    #[test]
    fn list_entries_applies_filters() {
        let mut db = Database::open_in_memory().unwrap();
        let block = db.create_block(&new_block("Sprint")).unwrap();
        let project = db
            .create_project(&NewProject {
                name: "Apollo".to_string(),
                client_id: None,
                rate: 90.0,
            })
            .unwrap();

        let in_block = db
            .create_entry(&NewEntry {
                block_id: Some(block.id),
                project_id: Some(project.id),
                ..new_entry("in block", Some(at(9, 0)), 60)
            })
            .unwrap();
        let other = db
            .create_entry(&new_entry("other", Some(at(15, 0)), 60))
            .unwrap();
        db.mark_entries_invoiced(&[other.id]).unwrap();

        let by_block = db
            .list_entries(&EntryFilter {
                block_id: Some(block.id),
                ..EntryFilter::default()
            })
            .unwrap();
        assert_eq!(by_block.len(), 1);
        assert_eq!(by_block[0].id, in_block.id);

        let by_project = db
            .list_entries(&EntryFilter {
                project_id: Some(project.id),
                ..EntryFilter::default()
            })
            .unwrap();
        assert_eq!(by_project.len(), 1);

        let invoiced = db
            .list_entries(&EntryFilter {
                invoiced: Some(true),
                ..EntryFilter::default()
            })
            .unwrap();
        assert_eq!(invoiced.len(), 1);
        assert_eq!(invoiced[0].id, other.id);

        let afternoon = db
            .list_entries(&EntryFilter {
                from: Some(at(12, 0)),
                to: Some(at(15, 0)),
                ..EntryFilter::default()
            })
            .unwrap();
        assert_eq!(afternoon.len(), 1);
        assert_eq!(afternoon[0].id, other.id);
    }

    #[test]
    fn unbilled_entries_excludes_invoiced_and_non_billable() {
        let mut db = Database::open_in_memory().unwrap();
        let open = db.create_entry(&new_entry("open", Some(at(9, 0)), 30)).unwrap();
        let done = db.create_entry(&new_entry("done", Some(at(10, 0)), 30)).unwrap();
        db.create_entry(&NewEntry {
            billable: false,
            ..new_entry("internal", Some(at(11, 0)), 30)
        })
        .unwrap();

        assert_eq!(db.mark_entries_invoiced(&[done.id, 999]).unwrap(), 1);

        let unbilled = db.unbilled_entries().unwrap();
        assert_eq!(unbilled.len(), 1);
        assert_eq!(unbilled[0].id, open.id);
    }

    #[test]
    fn malformed_entry_time_reads_as_absent() {
        let db = Database::open_in_memory().unwrap();
        let created = db
            .create_entry(&new_entry("messy", Some(at(9, 0)), 30))
            .unwrap();
        db.conn
            .execute(
                "UPDATE entries SET start_time = 'not-a-time' WHERE id = ?",
                [created.id],
            )
            .unwrap();

        let fetched = db.get_entry(created.id).unwrap().unwrap();
        assert!(fetched.start_time.is_none());
        assert_eq!(fetched.end_time, Some(at(9, 30)));
    }

    #[test]
    fn malformed_required_timestamp_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        let created = db
            .create_entry(&new_entry("messy", Some(at(9, 0)), 30))
            .unwrap();
        db.conn
            .execute(
                "UPDATE entries SET created_at = 'yesterday' WHERE id = ?",
                [created.id],
            )
            .unwrap();

        assert!(matches!(
            db.get_entry(created.id),
            Err(DbError::TimestampParse {
                table: "entries",
                ..
            })
        ));
    }

    #[test]
    fn create_block_switches_active_block() {
        let mut db = Database::open_in_memory().unwrap();
        let first = db.create_block(&new_block("Sprint 1")).unwrap();
        assert!(first.active);

        let second = db.create_block(&new_block("Sprint 2!")).unwrap();
        assert_eq!(second.name, "Sprint 2");

        let active = db.active_block().unwrap().unwrap();
        assert_eq!(active.id, second.id);
        assert!(!db.get_block(first.id).unwrap().unwrap().active);

        db.set_active_block(first.id).unwrap();
        assert_eq!(db.active_block().unwrap().unwrap().id, first.id);
        assert!(!db.get_block(second.id).unwrap().unwrap().active);
    }

    #[test]
    fn active_block_is_none_on_empty_database() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.active_block().unwrap().is_none());
        assert!(matches!(
            db.set_active_block(3),
            Err(DbError::NotFound { kind: "block", .. })
        ));
    }

    #[test]
    fn list_blocks_filters_by_client() {
        let mut db = Database::open_in_memory().unwrap();
        db.create_block(&new_block("Sprint 1")).unwrap();
        db.create_block(&NewBlock {
            client: "Globex".to_string(),
            ..new_block("Sprint 2")
        })
        .unwrap();

        assert_eq!(db.list_blocks(&BlockFilter::default()).unwrap().len(), 2);
        let globex = db
            .list_blocks(&BlockFilter {
                client: Some("Globex".to_string()),
                project: None,
            })
            .unwrap();
        assert_eq!(globex.len(), 1);
        assert_eq!(globex[0].name, "Sprint 2");
    }

    #[test]
    fn deleting_block_detaches_entries() {
        let mut db = Database::open_in_memory().unwrap();
        let block = db.create_block(&new_block("Sprint")).unwrap();
        let entry = db
            .create_entry(&NewEntry {
                block_id: Some(block.id),
                ..new_entry("work", Some(at(9, 0)), 30)
            })
            .unwrap();

        db.delete_block(block.id).unwrap();

        let fetched = db.get_entry(entry.id).unwrap().unwrap();
        assert!(fetched.block_id.is_none());
    }

    #[test]
    fn projects_crud_and_rates() {
        let db = Database::open_in_memory().unwrap();
        let client = db.create_client("Acme Corp", "ops@acme.test").unwrap();
        let mut zeus = db
            .create_project(&NewProject {
                name: "Zeus".to_string(),
                client_id: Some(client.id),
                rate: 120.0,
            })
            .unwrap();
        let apollo = db
            .create_project(&NewProject {
                name: "Apollo".to_string(),
                client_id: None,
                rate: 0.0,
            })
            .unwrap();

        let names: Vec<String> = db
            .list_projects(None)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Apollo", "Zeus"]);
        assert_eq!(db.list_projects(Some(client.id)).unwrap().len(), 1);

        assert_eq!(
            db.find_project_by_name("apollo").unwrap().map(|p| p.id),
            Some(apollo.id)
        );
        assert!(db.find_project_by_name("hermes").unwrap().is_none());

        zeus.rate = 150.0;
        db.update_project(&mut zeus).unwrap();
        let rates = db.project_rates().unwrap();
        assert!((rates[&zeus.id] - 150.0).abs() < f64::EPSILON);
        assert!(rates[&apollo.id].abs() < f64::EPSILON);

        db.delete_client(client.id).unwrap();
        assert!(db.get_project(zeus.id).unwrap().unwrap().client_id.is_none());

        db.delete_project(apollo.id).unwrap();
        assert!(matches!(
            db.delete_project(apollo.id),
            Err(DbError::NotFound { kind: "project", .. })
        ));
    }

    #[test]
    fn deleting_project_detaches_entries() {
        let db = Database::open_in_memory().unwrap();
        let project = db
            .create_project(&NewProject {
                name: "Hermes".to_string(),
                client_id: None,
                rate: 50.0,
            })
            .unwrap();
        let entry = db
            .create_entry(&NewEntry {
                project_id: Some(project.id),
                ..new_entry("work", Some(at(9, 0)), 30)
            })
            .unwrap();

        db.delete_project(project.id).unwrap();

        assert!(db.get_entry(entry.id).unwrap().unwrap().project_id.is_none());
    }

    #[test]
    fn clients_crud() {
        let db = Database::open_in_memory().unwrap();
        let mut globex = db.create_client("Globex", "").unwrap();
        db.create_client("Acme", "").unwrap();

        globex.contact_info = "hank@globex.test".to_string();
        db.update_client(&mut globex).unwrap();

        let clients = db.list_clients().unwrap();
        assert_eq!(clients[0].name, "Acme");
        assert_eq!(clients[1].contact_info, "hank@globex.test");
        assert_eq!(
            db.find_client_by_name("GLOBEX").unwrap().map(|c| c.id),
            Some(globex.id)
        );
    }

    #[test]
    fn templates_upsert_by_name() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_template("standup").unwrap().is_none());

        db.save_template("standup", "15m Chronos Meeting daily standup")
            .unwrap();
        db.save_template("standup", "20m Chronos Meeting daily standup")
            .unwrap();
        db.save_template("review", "1h Chronos Review code review")
            .unwrap();

        assert_eq!(
            db.get_template("standup").unwrap().as_deref(),
            Some("20m Chronos Meeting daily standup")
        );
        let names: Vec<String> = db
            .list_templates()
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["review", "standup"]);
    }

    #[test]
    fn query_history_returns_newest_first() {
        let db = Database::open_in_memory().unwrap();
        for query in ["first", "second", "third"] {
            db.save_query(query).unwrap();
        }

        assert_eq!(db.query_history(2).unwrap(), vec!["third", "second"]);
        assert_eq!(db.query_history(10).unwrap().len(), 3);
    }
}
