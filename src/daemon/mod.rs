//! The history daemon: a sequential Unix-socket server in front of the store.
//!
//! One connection at a time. Each connection carries one request, read until
//! the peer half-closes or `max_message_bytes` is exceeded, and gets one
//! response. Writes are handed to [`writer::WriteQueue`] so a RECORD never
//! waits on SQLite.

pub mod bootstrap;
pub mod branch_cache;
pub mod dispatch;
pub mod protocol;
pub mod render;
pub mod writer;

use std::io::{self, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{Config, DaemonConfig};
use crate::error::Result;
use crate::storage::{HistoryStore, RecordFilter};
use crate::utils::git::GitBranchResolver;

pub use branch_cache::BranchCache;
pub use dispatch::Dispatcher;
pub use writer::WriteQueue;

/// Pause after an accept error that is not a signal interruption.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct Server {
    listener: UnixListener,
    dispatcher: Dispatcher,
    socket_path: PathBuf,
    max_message_bytes: usize,
    read_timeout: Option<Duration>,
    stop: Arc<AtomicBool>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("socket_path", &self.socket_path)
            .field("max_message_bytes", &self.max_message_bytes)
            .field("read_timeout", &self.read_timeout)
            .finish_non_exhaustive()
    }
}

/// Stops a running [`Server`] from another thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    stop: Arc<AtomicBool>,
    socket_path: PathBuf,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
        // wake the blocking accept
        let _ = UnixStream::connect(&self.socket_path);
    }
}

impl Server {
    pub fn new(
        listener: UnixListener,
        dispatcher: Dispatcher,
        socket_path: PathBuf,
        config: &DaemonConfig,
    ) -> Self {
        Self {
            listener,
            dispatcher,
            socket_path,
            max_message_bytes: config.max_message_bytes.max(1),
            read_timeout: config.read_timeout(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open the store, start the writer thread and bind the socket.
    pub fn build(config: &Config) -> Result<Self> {
        let filter = RecordFilter::from_config(&config.record);
        let store = HistoryStore::open(config.db_path(), &config.storage, filter)?;

        match store.stats() {
            Ok(stats) => info!(
                commands = stats.commands,
                executions = stats.executions,
                contexts = stats.contexts,
                schema_version = stats.schema_version,
                db = %store.path().display(),
                "history loaded"
            ),
            Err(e) => warn!(error = %e, "could not read history stats"),
        }

        let queue = WriteQueue::spawn(store.open_writer()?, config.queue.capacity)?;
        let branches = BranchCache::new(GitBranchResolver, config.cache.branch_ttl());
        let dispatcher = Dispatcher::new(
            store,
            branches,
            queue,
            config.suggest.default_terminal_width,
        );

        let socket_path = config.socket_path();
        let listener = bootstrap::bind_socket(&socket_path)?;
        Ok(Self::new(listener, dispatcher, socket_path, &config.daemon))
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            stop: Arc::clone(&self.stop),
            socket_path: self.socket_path.clone(),
        }
    }

    /// Accept loop. Returns only after [`ShutdownHandle::shutdown`].
    pub fn run(&self) -> Result<()> {
        info!(socket = %self.socket_path.display(), "daemon listening");
        loop {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            match self.listener.accept() {
                Ok((stream, _)) => {
                    if self.stop.load(Ordering::SeqCst) {
                        break;
                    }
                    self.serve(stream);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    std::thread::sleep(ACCEPT_BACKOFF);
                }
            }
        }

        info!("daemon stopping");
        if let Err(e) = self.dispatcher.queue().flush() {
            warn!(error = %e, "could not drain write queue");
        }
        Ok(())
    }

    fn serve(&self, mut stream: UnixStream) {
        if let Err(e) = stream.set_read_timeout(self.read_timeout) {
            debug!(error = %e, "could not set read timeout");
        }

        let response = match read_message(&mut stream, self.max_message_bytes) {
            Ok(Some(payload)) => self.dispatcher.handle(&payload),
            Ok(None) => {
                debug!(limit = self.max_message_bytes, "oversized request");
                String::new()
            }
            Err(e) => {
                debug!(error = %e, "failed to read request");
                String::new()
            }
        };

        if response.is_empty() {
            return;
        }
        if let Err(e) = stream.write_all(response.as_bytes()) {
            debug!(error = %e, "client went away before the response");
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// Read to end of stream. `None` when the peer sent more than `limit` bytes.
fn read_message(stream: &mut impl Read, limit: usize) -> io::Result<Option<Vec<u8>>> {
    let mut buf = Vec::with_capacity(limit.min(4096));
    stream.by_ref().take(limit as u64 + 1).read_to_end(&mut buf)?;
    if buf.len() > limit {
        return Ok(None);
    }
    Ok(Some(buf))
}
