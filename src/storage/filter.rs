//! Write-path filter deciding which command lines are worth remembering.
//!
//! Every producer of history rows goes through [`RecordFilter`]: the daemon's
//! RECORD handler, [`HistoryWriter::append`](super::HistoryWriter::append),
//! the zsh importer, and the migration that purges old self-invocations.
//! Search never filters, so the history stays clean by construction.

use crate::config::RecordConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    programs: Vec<String>,
    ignore_comments: bool,
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self::from_config(&RecordConfig::default())
    }
}

impl RecordFilter {
    pub fn from_config(config: &RecordConfig) -> Self {
        Self {
            programs: config
                .exclude_programs
                .iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            ignore_comments: config.ignore_comments,
        }
    }

    /// Trim `raw` and return it if it should be stored.
    pub fn admit<'a>(&self, raw: &'a str) -> Option<&'a str> {
        let cmd = normalize(raw)?;
        if self.ignore_comments && cmd.starts_with('#') {
            return None;
        }
        if self.is_self_invocation(cmd) {
            return None;
        }
        Some(cmd)
    }

    /// True when the first word runs one of the excluded programs, by bare
    /// name or by path (`bsh`, `./bsh`, `/usr/local/bin/bsh`).
    pub fn is_self_invocation(&self, cmd: &str) -> bool {
        let Some(first) = cmd.split_whitespace().next() else {
            return false;
        };
        let program = first.rsplit('/').next().unwrap_or(first);
        self.programs.iter().any(|p| p == program)
    }
}

/// Trimmed command text, or `None` when nothing is left.
pub fn normalize(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
