//! Database migrations
//!
//! The schema version lives in `PRAGMA user_version`. Each step runs in its
//! own transaction together with the version bump, and every step can be
//! replayed on a database that already has its effects.

use rusqlite::{params, Connection};
use tracing::{debug, error, info, warn};

use crate::error::{BshError, Result};
use crate::storage::filter::RecordFilter;

struct Migration {
    version: u32,
    name: &'static str,
    /// Returns `true` when it rewrote or deleted rows, so a `VACUUM` should follow.
    apply: fn(&Connection, &RecordFilter) -> rusqlite::Result<bool>,
}

const MIGRATIONS: [Migration; 5] = [
    Migration {
        version: 1,
        name: "base_tables",
        apply: create_base_tables,
    },
    Migration {
        version: 2,
        name: "command_fts",
        apply: create_fts_index,
    },
    Migration {
        version: 3,
        name: "command_counters",
        apply: backfill_command_counters,
    },
    Migration {
        version: 4,
        name: "command_context",
        apply: build_command_context,
    },
    Migration {
        version: 5,
        name: "purge_excluded",
        apply: purge_excluded_commands,
    },
];

pub const SCHEMA_VERSION: u32 = MIGRATIONS.len() as u32;

/// SQL expression normalizing a raw `git_branch` column to the context key.
/// Must agree with [`crate::storage::normalize_branch`].
const BRANCH_KEY_SQL: &str = "CASE WHEN git_branch IS NULL \
     OR TRIM(git_branch) IN ('', 'unknown', 'HEAD') THEN '' ELSE TRIM(git_branch) END";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Nothing to do.
    UpToDate,
    /// At least one step applied.
    Migrated,
    /// The stored version is newer than this binary knows; nothing was touched.
    Unsupported,
    /// A step failed and was rolled back; the schema stays at `to`.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub from: u32,
    pub to: u32,
    pub applied: Vec<u32>,
    pub compacted: bool,
    pub outcome: MigrationOutcome,
}

pub fn current_version(conn: &Connection) -> Result<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?)
}

/// Run all pending migrations.
///
/// Only a failure to read the version is returned as an error. Step failures
/// and unknown versions are logged and reported through the outcome so the
/// caller can keep serving at whatever level was reached.
pub fn run_migrations(conn: &Connection, filter: &RecordFilter) -> Result<MigrationReport> {
    let from = current_version(conn)?;
    let mut report = MigrationReport {
        from,
        to: from,
        applied: Vec::new(),
        compacted: false,
        outcome: MigrationOutcome::UpToDate,
    };

    if from > SCHEMA_VERSION {
        warn!(
            found = from,
            latest = SCHEMA_VERSION,
            "database schema is newer than this build; skipping migrations"
        );
        report.outcome = MigrationOutcome::Unsupported;
        return Ok(report);
    }

    let mut needs_compaction = false;
    for migration in MIGRATIONS.iter().filter(|m| m.version > from) {
        debug!(version = migration.version, name = migration.name, "applying migration");
        let rewrote = match apply_step(conn, migration, filter) {
            Ok(rewrote) => rewrote,
            Err(err) => {
                error!(error = %err, "migration aborted");
                report.outcome = MigrationOutcome::Failed;
                break;
            }
        };
        report.to = migration.version;
        report.applied.push(migration.version);
        report.outcome = MigrationOutcome::Migrated;
        needs_compaction |= rewrote;
    }

    if needs_compaction {
        match conn.execute_batch("VACUUM;") {
            Ok(()) => report.compacted = true,
            Err(err) => warn!(error = %err, "post-migration VACUUM failed"),
        }
    }

    if !report.applied.is_empty() {
        info!(from = report.from, to = report.to, "schema migrated");
    }
    Ok(report)
}

fn apply_step(conn: &Connection, migration: &Migration, filter: &RecordFilter) -> Result<bool> {
    let fail = |err: rusqlite::Error| BshError::Migration {
        version: migration.version,
        reason: err.to_string(),
    };
    let tx = conn.unchecked_transaction().map_err(fail)?;
    let rewrote = (migration.apply)(&tx, filter).map_err(fail)?;
    tx.pragma_update(None, "user_version", migration.version)
        .map_err(fail)?;
    tx.commit().map_err(fail)?;
    Ok(rewrote)
}

fn create_base_tables(conn: &Connection, _filter: &RecordFilter) -> rusqlite::Result<bool> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS commands (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            cmd_text  TEXT UNIQUE NOT NULL
        );

        CREATE TABLE IF NOT EXISTS executions (
            id           INTEGER PRIMARY KEY,
            command_id   INTEGER NOT NULL REFERENCES commands(id),
            session_id   TEXT,
            cwd          TEXT,
            git_branch   TEXT,
            exit_code    INTEGER,
            duration_ms  INTEGER,
            timestamp    INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_exec_command ON executions(command_id);
        CREATE INDEX IF NOT EXISTS idx_exec_cwd ON executions(cwd);
        CREATE INDEX IF NOT EXISTS idx_exec_branch ON executions(git_branch);
        CREATE INDEX IF NOT EXISTS idx_exec_ts ON executions(timestamp);",
    )?;
    Ok(false)
}

fn create_fts_index(conn: &Connection, _filter: &RecordFilter) -> rusqlite::Result<bool> {
    conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS commands_fts USING fts5(
            cmd_text,
            content='commands',
            content_rowid='id',
            tokenize='unicode61'
        );

        CREATE TRIGGER IF NOT EXISTS commands_fts_ai AFTER INSERT ON commands BEGIN
            INSERT INTO commands_fts(rowid, cmd_text) VALUES (new.id, new.cmd_text);
        END;

        CREATE TRIGGER IF NOT EXISTS commands_fts_ad AFTER DELETE ON commands BEGIN
            INSERT INTO commands_fts(commands_fts, rowid, cmd_text)
            VALUES ('delete', old.id, old.cmd_text);
        END;

        CREATE TRIGGER IF NOT EXISTS commands_fts_au AFTER UPDATE OF cmd_text ON commands BEGIN
            INSERT INTO commands_fts(commands_fts, rowid, cmd_text)
            VALUES ('delete', old.id, old.cmd_text);
            INSERT INTO commands_fts(rowid, cmd_text) VALUES (new.id, new.cmd_text);
        END;

        INSERT INTO commands_fts(commands_fts) VALUES('rebuild');",
    )?;
    Ok(false)
}

fn backfill_command_counters(conn: &Connection, _filter: &RecordFilter) -> rusqlite::Result<bool> {
    if !has_column(conn, "commands", "last_timestamp")? {
        conn.execute_batch(
            "ALTER TABLE commands ADD COLUMN last_timestamp INTEGER NOT NULL DEFAULT 0;",
        )?;
    }
    if !has_column(conn, "commands", "success_count")? {
        conn.execute_batch(
            "ALTER TABLE commands ADD COLUMN success_count INTEGER NOT NULL DEFAULT 0;",
        )?;
    }

    conn.execute_batch(
        "UPDATE commands SET
            last_timestamp = COALESCE(
                (SELECT MAX(e.timestamp) FROM executions e WHERE e.command_id = commands.id), 0),
            success_count = (
                SELECT COUNT(*) FROM executions e
                WHERE e.command_id = commands.id AND e.exit_code = 0);

        CREATE INDEX IF NOT EXISTS idx_commands_recent ON commands(last_timestamp DESC, id DESC);",
    )?;
    Ok(false)
}

fn build_command_context(conn: &Connection, _filter: &RecordFilter) -> rusqlite::Result<bool> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS command_context (
            command_id      INTEGER NOT NULL REFERENCES commands(id),
            cwd             TEXT NOT NULL DEFAULT '',
            git_branch      TEXT NOT NULL DEFAULT '',
            success_count   INTEGER NOT NULL DEFAULT 0,
            last_timestamp  INTEGER NOT NULL DEFAULT 0,
            UNIQUE(command_id, cwd, git_branch)
        );

        CREATE INDEX IF NOT EXISTS idx_context_cwd
            ON command_context(cwd, last_timestamp DESC);
        CREATE INDEX IF NOT EXISTS idx_context_branch
            ON command_context(git_branch, last_timestamp DESC);

        DELETE FROM command_context;",
    )?;

    let folded = conn.execute(
        &format!(
            "INSERT INTO command_context (command_id, cwd, git_branch, success_count, last_timestamp)
             SELECT command_id,
                    COALESCE(cwd, ''),
                    {BRANCH_KEY_SQL},
                    SUM(CASE WHEN exit_code = 0 THEN 1 ELSE 0 END),
                    COALESCE(MAX(timestamp), 0)
             FROM executions
             GROUP BY command_id, COALESCE(cwd, ''), {BRANCH_KEY_SQL}"
        ),
        [],
    )?;
    Ok(folded > 0)
}

fn purge_excluded_commands(conn: &Connection, filter: &RecordFilter) -> rusqlite::Result<bool> {
    let doomed: Vec<i64> = {
        let mut stmt = conn.prepare("SELECT id, cmd_text FROM commands")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;
        let mut ids = Vec::new();
        for row in rows {
            let (id, text) = row?;
            if filter.admit(&text).is_none() {
                ids.push(id);
            }
        }
        ids
    };

    if doomed.is_empty() {
        return Ok(false);
    }

    let mut drop_executions = conn.prepare("DELETE FROM executions WHERE command_id = ?")?;
    let mut drop_contexts = conn.prepare("DELETE FROM command_context WHERE command_id = ?")?;
    let mut drop_command = conn.prepare("DELETE FROM commands WHERE id = ?")?;
    for id in &doomed {
        drop_executions.execute(params![id])?;
        drop_contexts.execute(params![id])?;
        drop_command.execute(params![id])?;
    }
    info!(purged = doomed.len(), "removed excluded commands from history");
    Ok(true)
}

fn has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        params![table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
