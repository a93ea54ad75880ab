//! Git utilities

use std::path::Path;

use git2::{ErrorCode, Repository};
use tracing::trace;

use crate::error::Result;

/// Resolves the checked-out branch for a working directory.
pub trait BranchResolver: Send + Sync {
    /// `Ok(None)` when `cwd` is outside a repository, or HEAD is unborn or detached.
    fn resolve(&self, cwd: &Path) -> Result<Option<String>>;
}

/// [`BranchResolver`] backed by libgit2 repository discovery.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitBranchResolver;

impl BranchResolver for GitBranchResolver {
    fn resolve(&self, cwd: &Path) -> Result<Option<String>> {
        current_branch_in(cwd)
    }
}

/// Get current branch name for a directory, searching parent directories for the repository.
pub fn current_branch_in(path: impl AsRef<Path>) -> Result<Option<String>> {
    let path = path.as_ref();
    let repo = match Repository::discover(path) {
        Ok(repo) => repo,
        Err(e) if e.code() == ErrorCode::NotFound => {
            trace!(path = %path.display(), "not inside a git repository");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let head = match repo.head() {
        Ok(head) => head,
        Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    if !head.is_branch() {
        return Ok(None); // detached HEAD
    }

    Ok(head
        .shorthand()
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != "HEAD")
        .map(str::to_string))
}
