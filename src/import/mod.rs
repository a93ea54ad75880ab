//! Import existing shell history into the store.
//!
//! Importers parse a history file into [`Execution`]s and hand them to
//! [`append_batch`](crate::storage::HistoryWriter::append_batch), so imported
//! rows go through the same record filter and aggregate updates as live RECORDs.
//!
//! ```ignore
//! use bsh::import::zsh;
//!
//! let mut writer = store.open_writer()?;
//! let summary = zsh::import_file(&zsh::default_history_path()?, &mut writer)?;
//! println!("{} of {} entries stored", summary.stored, summary.parsed);
//! ```

pub mod zsh;

use crate::storage::Execution;

/// Session id stamped on every imported execution.
pub const IMPORT_SESSION: &str = "import";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportSummary {
    /// Non-blank entries found in the file.
    pub parsed: usize,
    /// Entries that passed the record filter and were written.
    pub stored: usize,
}

/// An imported command has no cwd, no branch, and is assumed to have succeeded.
pub(crate) fn imported_execution(command: String, timestamp: i64, duration_ms: i64) -> Execution {
    Execution {
        command,
        session_id: IMPORT_SESSION.to_string(),
        cwd: String::new(),
        branch: None,
        exit_code: 0,
        duration_ms,
        timestamp,
    }
}
