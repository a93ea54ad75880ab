//! SUGGEST / RECORD handling.

use std::fmt::Write as _;
use std::path::Path;

use tracing::{debug, error, warn};

use crate::daemon::branch_cache::BranchCache;
use crate::daemon::protocol::{
    self, RecordRequest, Request, SuggestRequest, BOX_SENTINEL, BRANCH_PREFIX, ERROR_SENTINEL,
    SKIP_SENTINEL,
};
use crate::daemon::render;
use crate::daemon::writer::WriteQueue;
use crate::error::BshError;
use crate::storage::{Execution, HistoryStore, RecordFilter, SearchScope};

/// Turns one decoded request into one response payload.
///
/// Owns the read handle, the branch cache and the producer end of the write
/// queue; the writer thread behind the queue holds the only write handle.
pub struct Dispatcher {
    store: HistoryStore,
    branches: BranchCache,
    queue: WriteQueue,
    filter: RecordFilter,
    default_width: usize,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("store", &self.store)
            .field("queue_capacity", &self.queue.capacity())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(
        store: HistoryStore,
        branches: BranchCache,
        queue: WriteQueue,
        default_width: usize,
    ) -> Self {
        let filter = store.filter().clone();
        Self {
            store,
            branches,
            queue,
            filter,
            default_width,
        }
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    pub fn queue(&self) -> &WriteQueue {
        &self.queue
    }

    /// Malformed input yields an empty response.
    pub fn handle(&self, payload: &[u8]) -> String {
        match Request::decode(payload) {
            Ok(Request::Suggest(req)) => self.suggest(&req),
            Ok(Request::Record(req)) => self.record(req),
            Err(e) => {
                debug!(error = %e, bytes = payload.len(), "rejected malformed request");
                String::new()
            }
        }
    }

    pub fn suggest(&self, req: &SuggestRequest) -> String {
        let mut out = String::new();

        let (context, label) = match req.scope {
            SearchScope::Global => (String::new(), None),
            SearchScope::Directory => (req.context.clone(), Some(req.context.clone())),
            SearchScope::Branch => match self.branches.get(Path::new(&req.context)) {
                Some(branch) => {
                    let _ = writeln!(out, "{BRANCH_PREFIX}{branch}");
                    (branch.clone(), Some(branch))
                }
                None => {
                    debug!(cwd = %req.context, "no branch, skipping suggestion");
                    return format!("{SKIP_SENTINEL}\n");
                }
            },
        };

        let hits = match self
            .store
            .search(&req.query, req.scope, &context, req.only_success)
        {
            Ok(hits) => hits,
            Err(e) => {
                error!(error = %e, scope = req.scope.as_str(), "search failed");
                return format!("{ERROR_SENTINEL}\n");
            }
        };

        if hits.is_empty() {
            return out;
        }

        for hit in &hits {
            out.push_str(&protocol::escape_line(&hit.command));
            out.push('\n');
        }

        let width = req
            .terminal_width
            .map_or(self.default_width, usize::from);
        let title = render::header(req.scope, label.as_deref(), req.only_success);
        out.push_str(BOX_SENTINEL);
        out.push('\n');
        out.push_str(&render::render_box(&hits, &title, width));
        out
    }

    pub fn record(&self, req: RecordRequest) -> String {
        if self.filter.admit(&req.command).is_none() {
            debug!("record ignored by filter");
            return protocol::OK.to_string();
        }

        let branch = if req.cwd.is_empty() {
            None
        } else {
            self.branches.get(Path::new(&req.cwd))
        };

        let event = Execution {
            command: req.command,
            session_id: req.session_id,
            cwd: req.cwd,
            branch,
            exit_code: req.exit_code,
            duration_ms: req.duration_ms,
            timestamp: chrono::Utc::now().timestamp(),
        };

        match self.queue.submit(event) {
            Ok(()) => protocol::OK.to_string(),
            Err(BshError::QueueFull(capacity)) => {
                warn!(capacity, "write queue full, dropping execution");
                protocol::BUSY.to_string()
            }
            Err(e) => {
                error!(error = %e, "write queue unavailable");
                protocol::ERR.to_string()
            }
        }
    }
}
