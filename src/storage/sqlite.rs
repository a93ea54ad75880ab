//! SQLite history store
//!
//! [`HistoryStore`] owns the read/admin connection and runs migrations on
//! open. Mutations go through a [`HistoryWriter`], a second connection meant
//! to be owned by exactly one thread.

use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use tracing::debug;

use crate::config::StorageConfig;
use crate::error::Result;
use crate::storage::filter::RecordFilter;
use crate::storage::migrations::{self, MigrationReport};
use crate::storage::normalize_branch;

/// Suggestions never return more than this many rows.
pub const MAX_RESULTS: usize = 5;

/// Query breadth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchScope {
    Global,
    Directory,
    Branch,
}

impl SearchScope {
    /// Parse the wire spelling (`global`, `dir`, `branch`).
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "global" => Some(Self::Global),
            "dir" => Some(Self::Directory),
            "branch" => Some(Self::Branch),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Directory => "dir",
            Self::Branch => "branch",
        }
    }
}

/// One executed command line, as reported by a shell hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub command: String,
    pub session_id: String,
    pub cwd: String,
    pub branch: Option<String>,
    pub exit_code: i32,
    pub duration_ms: i64,
    /// Unix seconds.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Recorded { command_id: i64 },
    /// Blank or excluded by the record filter; nothing was written.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub id: i64,
    pub command: String,
    /// Successes within the searched scope.
    pub success_count: i64,
    /// Most recent use within the searched scope.
    pub last_timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HistoryStats {
    pub commands: i64,
    pub executions: i64,
    pub contexts: i64,
    pub schema_version: u32,
}

/// How the user's query text constrains the command dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TextMatch {
    All,
    /// FTS5 prefix phrase.
    Fts(String),
    /// Literal substring, for input the tokenizer would reduce to nothing.
    Substring(String),
}

impl TextMatch {
    fn from_query(query: &str) -> Self {
        let cleaned: String = query.chars().filter(|c| !c.is_control()).collect();
        let trimmed = cleaned.trim();
        if trimmed.is_empty() {
            Self::All
        } else if trimmed.chars().any(char::is_alphanumeric) {
            Self::Fts(format!("\"{}\" *", trimmed.replace('"', "\"\"")))
        } else {
            Self::Substring(trimmed.to_string())
        }
    }

    fn clause(&self, column: &str) -> Option<String> {
        match self {
            Self::All => None,
            Self::Fts(_) => Some(format!(
                "{column} IN (SELECT rowid FROM commands_fts WHERE commands_fts MATCH ?)"
            )),
            Self::Substring(_) => Some("instr(c.cmd_text, ?) > 0".to_string()),
        }
    }

    fn param(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Fts(expr) => Some(expr),
            Self::Substring(needle) => Some(needle),
        }
    }
}

pub struct HistoryStore {
    path: PathBuf,
    reader: Mutex<Connection>,
    filter: RecordFilter,
    busy_timeout: Duration,
    migration: MigrationReport,
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore")
            .field("path", &self.path)
            .field("schema_version", &self.migration.to)
            .finish_non_exhaustive()
    }
}

impl HistoryStore {
    /// Open (creating if needed) the database at `path` and bring the schema up to date.
    pub fn open(
        path: impl AsRef<Path>,
        config: &StorageConfig,
        filter: RecordFilter,
    ) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let busy_timeout = config.busy_timeout();
        let conn = Connection::open(path)?;
        configure_connection(&conn, busy_timeout)?;
        let migration = migrations::run_migrations(&conn, &filter)?;

        Ok(Self {
            path: path.to_path_buf(),
            reader: Mutex::new(conn),
            filter,
            busy_timeout,
            migration,
        })
    }

    /// Open the dedicated write handle. Only one should exist per database.
    pub fn open_writer(&self) -> Result<HistoryWriter> {
        let conn = Connection::open(&self.path)?;
        configure_connection(&conn, self.busy_timeout)?;
        Ok(HistoryWriter {
            conn,
            filter: self.filter.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn filter(&self) -> &RecordFilter {
        &self.filter
    }

    /// Outcome of the migrations run when this store was opened.
    pub fn migration_report(&self) -> &MigrationReport {
        &self.migration
    }

    pub fn schema_version(&self) -> u32 {
        self.migration.to
    }

    /// Up to [`MAX_RESULTS`] distinct commands matching `query`, most recent first.
    pub fn search(
        &self,
        query: &str,
        scope: SearchScope,
        context: &str,
        only_success: bool,
    ) -> Result<Vec<SearchHit>> {
        self.search_limited(query, scope, context, only_success, MAX_RESULTS)
    }

    /// [`search`](Self::search) with a caller-chosen row limit.
    pub fn search_limited(
        &self,
        query: &str,
        scope: SearchScope,
        context: &str,
        only_success: bool,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let text = TextMatch::from_query(query);
        let mut clauses: Vec<String> = Vec::new();
        let mut args: Vec<&str> = Vec::new();

        let sql = match scope {
            SearchScope::Global => {
                if let Some(clause) = text.clause("c.id") {
                    clauses.push(clause);
                }
                args.extend(text.param());
                if only_success {
                    clauses.push("c.success_count > 0".to_string());
                }
                format!(
                    "SELECT c.id, c.cmd_text, c.success_count, c.last_timestamp
                     FROM commands c
                     {where_sql}
                     ORDER BY c.last_timestamp DESC, c.id DESC
                     LIMIT {limit}",
                    where_sql = where_clause(&clauses),
                )
            }
            SearchScope::Directory | SearchScope::Branch => {
                let (column, key) = if scope == SearchScope::Directory {
                    ("cc.cwd", context)
                } else {
                    ("cc.git_branch", normalize_branch(context))
                };
                clauses.push(format!("{column} = ?"));
                args.push(key);
                if let Some(clause) = text.clause("c.id") {
                    clauses.push(clause);
                }
                args.extend(text.param());
                let having = if only_success {
                    "HAVING SUM(cc.success_count) > 0"
                } else {
                    ""
                };
                format!(
                    "SELECT c.id, c.cmd_text, SUM(cc.success_count), MAX(cc.last_timestamp) AS last_ts
                     FROM command_context cc
                     JOIN commands c ON c.id = cc.command_id
                     {where_sql}
                     GROUP BY c.id
                     {having}
                     ORDER BY last_ts DESC, c.id DESC
                     LIMIT {limit}",
                    where_sql = where_clause(&clauses),
                )
            }
        };

        let conn = self.reader.lock();
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
            Ok(SearchHit {
                id: row.get(0)?,
                command: row.get(1)?,
                success_count: row.get(2)?,
                last_timestamp: row.get(3)?,
            })
        })?;

        let mut hits = Vec::new();
        for row in rows {
            hits.push(row?);
        }
        debug!(scope = scope.as_str(), hits = hits.len(), "history search");
        Ok(hits)
    }

    /// Look up a command's dictionary row by its exact (trimmed) text.
    pub fn command(&self, text: &str) -> Result<Option<SearchHit>> {
        let conn = self.reader.lock();
        let hit = conn
            .query_row(
                "SELECT id, cmd_text, success_count, last_timestamp FROM commands WHERE cmd_text = ?",
                [text.trim()],
                |row| {
                    Ok(SearchHit {
                        id: row.get(0)?,
                        command: row.get(1)?,
                        success_count: row.get(2)?,
                        last_timestamp: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(hit)
    }

    pub fn stats(&self) -> Result<HistoryStats> {
        let conn = self.reader.lock();
        let count = |table: &str| -> rusqlite::Result<i64> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        };
        Ok(HistoryStats {
            commands: count("commands")?,
            executions: count("executions")?,
            contexts: count("command_context")?,
            schema_version: migrations::current_version(&conn)?,
        })
    }

    pub fn integrity_check(&self) -> Result<bool> {
        let conn = self.reader.lock();
        let result: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }
}

/// The single mutating handle into the history database.
pub struct HistoryWriter {
    conn: Connection,
    filter: RecordFilter,
}

impl std::fmt::Debug for HistoryWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryWriter").finish_non_exhaustive()
    }
}

impl HistoryWriter {
    /// Record one execution. The command row, the execution row, the context
    /// aggregate and the command counters change together or not at all.
    pub fn append(&mut self, event: &Execution) -> Result<AppendOutcome> {
        let Some(cmd) = self.filter.admit(&event.command) else {
            return Ok(AppendOutcome::Skipped);
        };
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let command_id = append_in(&tx, cmd, event)?;
        tx.commit()?;
        Ok(AppendOutcome::Recorded { command_id })
    }

    /// Record many executions in one transaction. Returns how many were stored.
    pub fn append_batch(&mut self, events: &[Execution]) -> Result<usize> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut stored = 0;
        for event in events {
            if let Some(cmd) = self.filter.admit(&event.command) {
                append_in(&tx, cmd, event)?;
                stored += 1;
            }
        }
        tx.commit()?;
        Ok(stored)
    }
}

fn append_in(conn: &Connection, cmd: &str, event: &Execution) -> rusqlite::Result<i64> {
    conn.prepare_cached("INSERT OR IGNORE INTO commands (cmd_text) VALUES (?1)")?
        .execute([cmd])?;
    let command_id: i64 = conn
        .prepare_cached("SELECT id FROM commands WHERE cmd_text = ?1")?
        .query_row([cmd], |row| row.get(0))?;

    let branch_key = event.branch.as_deref().map_or("", normalize_branch);
    let stored_branch = (!branch_key.is_empty()).then_some(branch_key);
    let successes = i64::from(event.exit_code == 0);

    conn.prepare_cached(
        "INSERT INTO executions
            (command_id, session_id, cwd, git_branch, exit_code, duration_ms, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?
    .execute(params![
        command_id,
        event.session_id,
        event.cwd,
        stored_branch,
        event.exit_code,
        event.duration_ms,
        event.timestamp,
    ])?;

    conn.prepare_cached(
        "INSERT INTO command_context (command_id, cwd, git_branch, success_count, last_timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(command_id, cwd, git_branch) DO UPDATE SET
            success_count = success_count + excluded.success_count,
            last_timestamp = MAX(last_timestamp, excluded.last_timestamp)",
    )?
    .execute(params![command_id, event.cwd, branch_key, successes, event.timestamp])?;

    conn.prepare_cached(
        "UPDATE commands SET
            success_count = success_count + ?2,
            last_timestamp = MAX(last_timestamp, ?3)
         WHERE id = ?1",
    )?
    .execute(params![command_id, successes, event.timestamp])?;

    Ok(command_id)
}

fn where_clause(clauses: &[String]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    }
}

fn configure_connection(conn: &Connection, busy_timeout: Duration) -> Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA temp_store = MEMORY;
         PRAGMA foreign_keys = ON;",
    )?;
    Ok(())
}
