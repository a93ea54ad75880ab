//! Storage layer for bsh
//!
//! SQLite history: an append-only `executions` log, the `commands`
//! dictionary with denormalized counters, and the `command_context`
//! aggregate that serves directory- and branch-scoped lookups.

pub mod filter;
pub mod migrations;
pub mod sqlite;

pub use filter::RecordFilter;
pub use migrations::{MigrationOutcome, MigrationReport, SCHEMA_VERSION};
pub use sqlite::{
    AppendOutcome, Execution, HistoryStats, HistoryStore, HistoryWriter, MAX_RESULTS,
    SearchHit, SearchScope,
};

/// Context key for a branch name: `unknown`, `HEAD` and blank mean "no branch" (`""`).
pub fn normalize_branch(branch: &str) -> &str {
    match branch.trim() {
        "unknown" | "HEAD" => "",
        other => other,
    }
}
