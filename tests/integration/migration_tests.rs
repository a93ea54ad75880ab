use std::path::Path;

use bsh::config::StorageConfig;
use bsh::storage::{HistoryStore, MigrationOutcome, RecordFilter, SearchScope, SCHEMA_VERSION};
use rusqlite::Connection;
use tempfile::TempDir;

/// The unversioned layout written by the old Python importer.
fn write_legacy_db(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE commands (id INTEGER PRIMARY KEY AUTOINCREMENT, cmd_text TEXT UNIQUE NOT NULL);
         CREATE TABLE executions (
             id INTEGER PRIMARY KEY, command_id INTEGER, session_id TEXT, cwd TEXT,
             git_branch TEXT, exit_code INTEGER, duration_ms INTEGER, timestamp INTEGER,
             FOREIGN KEY (command_id) REFERENCES commands (id));
         INSERT INTO commands (cmd_text) VALUES ('docker ps'), ('bsh suggest d'), ('npm start');
         INSERT INTO executions (command_id, session_id, cwd, git_branch, exit_code, duration_ms, timestamp)
         VALUES (1, 'import', NULL, NULL, 0, 0, 1670000000),
                (2, 'import', NULL, NULL, 0, 0, 1670000001),
                (3, 'import', '/app', 'unknown', 1, 0, 1670000002),
                (1, 's', '/app', 'main', 0, 10, 1670000003);",
    )
    .unwrap();
}

fn open(path: &Path) -> HistoryStore {
    HistoryStore::open(path, &StorageConfig::default(), RecordFilter::default()).unwrap()
}

fn names(store: &HistoryStore, query: &str, scope: SearchScope, context: &str) -> Vec<String> {
    store
        .search(query, scope, context, false)
        .unwrap()
        .into_iter()
        .map(|hit| hit.command)
        .collect()
}

#[test]
fn legacy_database_is_upgraded_in_place() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.db");
    write_legacy_db(&path);

    let store = open(&path);
    let report = store.migration_report();
    assert_eq!(report.outcome, MigrationOutcome::Migrated);
    assert_eq!(report.from, 0);
    assert_eq!(report.to, SCHEMA_VERSION);
    assert!(report.compacted);

    assert_eq!(names(&store, "", SearchScope::Global, ""), vec!["docker ps", "npm start"]);
    assert_eq!(names(&store, "np", SearchScope::Directory, "/app"), vec!["npm start"]);
    assert_eq!(names(&store, "", SearchScope::Branch, "main"), vec!["docker ps"]);
    // `unknown` was folded into "no branch"
    assert_eq!(names(&store, "", SearchScope::Branch, ""), vec!["npm start", "docker ps"]);

    let docker = store.command("docker ps").unwrap().unwrap();
    assert_eq!(docker.success_count, 2);
    assert_eq!(docker.last_timestamp, 1_670_000_003);
    assert!(store.command("bsh suggest d").unwrap().is_none());
    assert!(store.integrity_check().unwrap());
}

#[test]
fn reopening_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.db");
    write_legacy_db(&path);

    let before = open(&path).stats().unwrap();
    let again = open(&path);
    assert_eq!(again.migration_report().outcome, MigrationOutcome::UpToDate);
    assert!(again.migration_report().applied.is_empty());
    assert_eq!(again.stats().unwrap(), before);
}

#[test]
fn newer_schema_is_left_alone() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.db");
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE future (x); PRAGMA user_version = 42;")
            .unwrap();
    }

    let store = open(&path);
    assert_eq!(store.migration_report().outcome, MigrationOutcome::Unsupported);
    assert_eq!(store.schema_version(), 42);

    let conn = Connection::open(&path).unwrap();
    let tables: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'commands'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(tables, 0);
}
