use std::collections::HashSet;

use proptest::prelude::*;

use bsh::config::StorageConfig;
use bsh::storage::migrations::run_migrations;
use bsh::storage::{
    Execution, HistoryStore, RecordFilter, SearchHit, SearchScope, SCHEMA_VERSION,
};
use rusqlite::Connection;
use tempfile::TempDir;

const COMMANDS: &[&str] = &[
    "git status",
    "git stash pop",
    "git commit -m \"wip\"",
    "cargo build",
    "cargo test --all",
    "ls -la",
    "docker ps",
    "echo 'hi'",
    "bsh suggest git",
    "npm start",
];
const CWDS: &[&str] = &["/repo", "/repo/src", "/tmp", ""];
const BRANCHES: &[Option<&str>] = &[
    Some("main"),
    Some(" main "),
    Some("dev"),
    Some("unknown"),
    Some("HEAD"),
    Some(" "),
    None,
];

/// Enough to cover every distinct command, so the result cap never truncates.
const UNLIMITED: usize = 1_000;

fn arb_execution() -> impl Strategy<Value = Execution> {
    (
        prop::sample::select(COMMANDS),
        prop::sample::select(CWDS),
        prop::sample::select(BRANCHES),
        0..3i32,
        0..50i64,
        prop::bool::ANY,
    )
        .prop_map(|(cmd, cwd, branch, exit_code, timestamp, pad)| Execution {
            command: if pad { format!("  {cmd} ") } else { cmd.to_string() },
            session_id: "prop".to_string(),
            cwd: cwd.to_string(),
            branch: branch.map(str::to_string),
            exit_code,
            duration_ms: 1,
            timestamp,
        })
}

fn arb_scope() -> impl Strategy<Value = (SearchScope, &'static str)> {
    prop_oneof![
        Just((SearchScope::Global, "")),
        prop::sample::select(CWDS).prop_map(|cwd| (SearchScope::Directory, cwd)),
        prop::sample::select(&["main", "dev", "unknown", ""][..])
            .prop_map(|branch| (SearchScope::Branch, branch)),
    ]
}

fn arb_query() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::sample::select(&["", "git", "git st", "car", "ls", "\"", "-", "echo '"][..])
            .prop_map(str::to_string),
        ".{0,12}",
    ]
}

fn seeded(history: &[Execution]) -> (TempDir, HistoryStore) {
    let dir = TempDir::new().unwrap();
    let store = HistoryStore::open(
        dir.path().join("history.db"),
        &StorageConfig::default(),
        RecordFilter::default(),
    )
    .unwrap();
    store.open_writer().unwrap().append_batch(history).unwrap();
    (dir, store)
}

type ContextRow = (i64, String, String, i64, i64);

fn context_rows(conn: &Connection) -> Vec<ContextRow> {
    let mut stmt = conn
        .prepare(
            "SELECT command_id, cwd, git_branch, success_count, last_timestamp
             FROM command_context ORDER BY command_id, cwd, git_branch",
        )
        .unwrap();
    stmt.query_map([], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
    })
    .unwrap()
    .collect::<rusqlite::Result<Vec<_>>>()
    .unwrap()
}

fn ids(hits: &[SearchHit]) -> HashSet<i64> {
    hits.iter().map(|hit| hit.id).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn success_filter_is_a_subset(
        history in prop::collection::vec(arb_execution(), 0..40),
        (scope, context) in arb_scope(),
        query in arb_query(),
    ) {
        let (_dir, store) = seeded(&history);

        let all = store.search_limited(&query, scope, context, false, UNLIMITED).unwrap();
        let successful = store.search_limited(&query, scope, context, true, UNLIMITED).unwrap();

        let expected: HashSet<i64> = all
            .iter()
            .filter(|hit| hit.success_count > 0)
            .map(|hit| hit.id)
            .collect();
        prop_assert_eq!(ids(&successful), expected);
    }

    #[test]
    fn results_are_distinct_trimmed_and_recent_first(
        history in prop::collection::vec(arb_execution(), 1..40),
        (scope, context) in arb_scope(),
        query in arb_query(),
        only_success in prop::bool::ANY,
    ) {
        let (_dir, store) = seeded(&history);
        let hits = store.search(&query, scope, context, only_success).unwrap();

        prop_assert!(hits.len() <= bsh::storage::MAX_RESULTS);
        prop_assert_eq!(ids(&hits).len(), hits.len());
        for hit in &hits {
            prop_assert_eq!(hit.command.trim(), hit.command.as_str());
            prop_assert!(!hit.command.starts_with("bsh "));
        }
        for pair in hits.windows(2) {
            prop_assert!(
                (pair[0].last_timestamp, pair[0].id) > (pair[1].last_timestamp, pair[1].id)
            );
        }
    }

    #[test]
    fn global_counters_match_the_log(history in prop::collection::vec(arb_execution(), 0..40)) {
        let (_dir, store) = seeded(&history);

        for cmd in COMMANDS.iter().filter(|c| !c.starts_with("bsh")) {
            let runs: Vec<&Execution> =
                history.iter().filter(|e| e.command.trim() == *cmd).collect();
            let row = store.command(cmd).unwrap();
            if runs.is_empty() {
                prop_assert!(row.is_none());
                continue;
            }
            let row = row.unwrap();
            let successes = runs.iter().filter(|e| e.exit_code == 0).count() as i64;
            let latest = runs.iter().map(|e| e.timestamp).max().unwrap_or(0);
            prop_assert_eq!(row.success_count, successes);
            prop_assert_eq!(row.last_timestamp, latest);
        }
    }

    #[test]
    fn incremental_contexts_match_a_replay_of_the_log(
        history in prop::collection::vec(arb_execution(), 0..40),
    ) {
        let (dir, _store) = seeded(&history);
        let conn = Connection::open(dir.path().join("history.db")).unwrap();
        let incremental = context_rows(&conn);

        conn.pragma_update(None, "user_version", 3).unwrap();
        let report = run_migrations(&conn, &RecordFilter::default()).unwrap();
        prop_assert_eq!(report.to, SCHEMA_VERSION);
        prop_assert_eq!(context_rows(&conn), incremental);
    }
}
