//! zsh history files, plain or `EXTENDED_HISTORY` (`: <start>:<elapsed>;<command>`).

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{BshError, Result};
use crate::import::{imported_execution, ImportSummary};
use crate::storage::{Execution, HistoryWriter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub command: String,
    /// Unix seconds; 0 for plain entries.
    pub timestamp: i64,
    pub duration_secs: i64,
}

/// `$HISTFILE`, else `~/.zsh_history`.
pub fn default_history_path() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os("HISTFILE").filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    dirs::home_dir()
        .map(|home| home.join(".zsh_history"))
        .ok_or_else(|| BshError::Import("cannot determine home directory".to_string()))
}

/// Parse one logical history line.
pub fn parse_entry(line: &str) -> Option<HistoryEntry> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (command, timestamp, duration_secs) = match parse_extended(line) {
        Some(parsed) => parsed,
        None => (line, 0, 0),
    };

    let command = command.trim();
    (!command.is_empty()).then(|| HistoryEntry {
        command: command.to_string(),
        timestamp,
        duration_secs,
    })
}

fn parse_extended(line: &str) -> Option<(&str, i64, i64)> {
    let rest = line.strip_prefix(':')?.trim_start();
    let (start, rest) = rest.split_once(':')?;
    let (elapsed, command) = rest.split_once(';')?;
    if !is_digits(start) || !is_digits(elapsed) {
        return None;
    }
    Some((command, start.parse().ok()?, elapsed.parse().ok()?))
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Parse a whole history file. A trailing backslash continues a command on
/// the next line, as zsh writes multi-line commands.
pub fn parse(text: &str) -> Vec<HistoryEntry> {
    let mut entries = Vec::new();
    let mut pending = String::new();

    for line in text.lines() {
        if let Some(head) = line.strip_suffix('\\') {
            pending.push_str(head);
            pending.push('\n');
            continue;
        }
        pending.push_str(line);
        if let Some(entry) = parse_entry(&pending) {
            entries.push(entry);
        }
        pending.clear();
    }
    if let Some(entry) = parse_entry(&pending) {
        entries.push(entry);
    }
    entries
}

/// Convert parsed entries into executions.
pub fn to_executions(entries: Vec<HistoryEntry>) -> Vec<Execution> {
    entries
        .into_iter()
        .map(|e| {
            imported_execution(e.command, e.timestamp, e.duration_secs.saturating_mul(1000))
        })
        .collect()
}

/// Read `path` and append every entry in one transaction.
pub fn import_file(path: &Path, writer: &mut HistoryWriter) -> Result<ImportSummary> {
    let bytes = std::fs::read(path).map_err(|e| {
        BshError::Import(format!("cannot read {}: {e}", path.display()))
    })?;
    // zsh metafies non-ASCII bytes; keep whatever decodes
    let text = String::from_utf8_lossy(&bytes);
    let entries = parse(&text);
    debug!(path = %path.display(), entries = entries.len(), "parsed zsh history");

    let parsed = entries.len();
    let stored = writer.append_batch(&to_executions(entries))?;
    info!(parsed, stored, "zsh history imported");
    Ok(ImportSummary { parsed, stored })
}
