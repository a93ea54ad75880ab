//! Short-lived memo of directory → git branch lookups.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::utils::git::BranchResolver;

#[derive(Debug, Clone)]
struct CacheEntry {
    /// `None` = no branch (not a repository, detached, or the lookup failed).
    branch: Option<String>,
    captured_at: Instant,
}

pub struct BranchCache {
    resolver: Box<dyn BranchResolver>,
    ttl: Duration,
    entries: Mutex<HashMap<PathBuf, CacheEntry>>,
}

impl std::fmt::Debug for BranchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BranchCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.entries.lock().len())
            .finish_non_exhaustive()
    }
}

impl BranchCache {
    pub fn new(resolver: impl BranchResolver + 'static, ttl: Duration) -> Self {
        Self {
            resolver: Box::new(resolver),
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Branch checked out at `dir`, or `None`.
    pub fn get(&self, dir: &Path) -> Option<String> {
        self.get_at(dir, Instant::now())
    }

    /// [`get`](Self::get) against an explicit clock.
    pub fn get_at(&self, dir: &Path, now: Instant) -> Option<String> {
        if let Some(entry) = self.entries.lock().get(dir) {
            if now.saturating_duration_since(entry.captured_at) < self.ttl {
                trace!(dir = %dir.display(), "branch cache hit");
                return entry.branch.clone();
            }
        }

        // Resolution runs unlocked; a racing lookup for the same key just overwrites.
        let branch = match self.resolver.resolve(dir) {
            Ok(branch) => branch,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "branch resolution failed");
                None
            }
        };

        self.entries.lock().insert(
            dir.to_path_buf(),
            CacheEntry {
                branch: branch.clone(),
                captured_at: now,
            },
        );
        branch
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
