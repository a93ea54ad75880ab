use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bsh::config::Config;
use bsh::daemon::protocol::{RecordRequest, Request, SuggestRequest};
use bsh::daemon::{Server, ShutdownHandle};
use bsh::storage::SearchScope;
use tempfile::TempDir;

/// A daemon serving a throwaway database on a throwaway socket.
pub struct DaemonFixture {
    pub dir: TempDir,
    pub socket: PathBuf,
    pub db: PathBuf,
    shutdown: ShutdownHandle,
    thread: Option<JoinHandle<bsh::Result<()>>>,
}

impl DaemonFixture {
    pub fn start() -> Self {
        Self::start_with(|_| {})
    }

    pub fn start_with(tweak: impl FnOnce(&mut Config)) -> Self {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("bsh.sock");
        let db = dir.path().join("data").join("history.db");

        let mut config = Config::default();
        config.daemon.socket_path = Some(socket.clone());
        config.storage.db_path = Some(db.clone());
        tweak(&mut config);

        let server = Server::build(&config).unwrap();
        let shutdown = server.shutdown_handle();
        let thread = std::thread::spawn(move || server.run());

        Self {
            dir,
            socket,
            db,
            shutdown,
            thread: Some(thread),
        }
    }

    pub fn send_raw(&self, payload: &[u8]) -> String {
        let mut stream = UnixStream::connect(&self.socket).unwrap();
        // the daemon may hang up early on oversized input
        let _ = stream.write_all(payload);
        let _ = stream.shutdown(Shutdown::Write);
        let mut reply = Vec::new();
        let _ = stream.read_to_end(&mut reply);
        String::from_utf8_lossy(&reply).into_owned()
    }

    pub fn record(&self, cmd: &str, cwd: &Path, exit_code: i32) -> String {
        let request = Request::Record(RecordRequest {
            command: cmd.to_string(),
            session_id: "test".to_string(),
            cwd: cwd.to_string_lossy().into_owned(),
            exit_code,
            duration_ms: 7,
        });
        bsh::client::send(&self.socket, &request).unwrap()
    }

    pub fn suggest(&self, query: &str, scope: SearchScope, cwd: &Path, only_success: bool) -> String {
        let request = Request::Suggest(SuggestRequest {
            query: query.to_string(),
            scope,
            context: cwd.to_string_lossy().into_owned(),
            only_success,
            terminal_width: Some(80),
        });
        bsh::client::send(&self.socket, &request).unwrap()
    }

    pub fn stop(mut self) -> bsh::Result<()> {
        self.shutdown.shutdown();
        self.thread.take().unwrap().join().unwrap()
    }
}

impl Drop for DaemonFixture {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.shutdown.shutdown();
            let _ = thread.join();
        }
    }
}

/// Raw result lines of a SUGGEST reply (out-of-band `##` lines and the box removed).
pub fn raw_lines(reply: &str) -> Vec<String> {
    reply
        .lines()
        .take_while(|line| *line != "##BOX##")
        .filter(|line| !line.starts_with("##"))
        .map(str::to_string)
        .collect()
}

/// Poll `check` until it holds; records are applied behind the reply.
pub fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    false
}
