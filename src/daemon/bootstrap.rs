//! Process bootstrap: directories, socket binding and detaching.

use std::fs::{self, OpenOptions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::process::{Command, Stdio};

use nix::unistd::setsid;
use tracing::{debug, info};

use crate::error::Result;

/// Create `dir` (and parents) readable only by the owner.
pub fn ensure_private_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

/// Bind the daemon socket at `path`, replacing a stale socket file.
///
/// Fails with `AddrInUse` if another daemon is answering on `path`.
pub fn bind_socket(path: &Path) -> Result<UnixListener> {
    if let Some(parent) = path.parent() {
        ensure_private_dir(parent)?;
    }

    if path.exists() {
        if UnixStream::connect(path).is_ok() {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("a daemon is already listening on {}", path.display()),
            )
            .into());
        }
        debug!(socket = %path.display(), "removing stale socket");
        fs::remove_file(path)?;
    }

    let listener = UnixListener::bind(path)?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(listener)
}

/// Re-launch this executable as `bsh daemon --foreground --detached` with
/// stdin/stdout closed and stderr appended to `log_path`. The child leaves
/// the terminal's session itself through [`start_session`]. Returns its pid.
pub fn detach(config_path: Option<&Path>, verbose: u8, log_path: &Path) -> Result<u32> {
    if let Some(parent) = log_path.parent() {
        ensure_private_dir(parent)?;
    }
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    let exe = std::env::current_exe()?;
    let mut cmd = Command::new(exe);
    if let Some(path) = config_path {
        cmd.arg("--config").arg(path);
    }
    if verbose > 0 {
        cmd.arg(format!("-{}", "v".repeat(usize::from(verbose))));
    }
    cmd.args(["daemon", "--foreground", "--detached"])
        .current_dir("/")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(log));

    let child = cmd.spawn()?;
    info!(pid = child.id(), log = %log_path.display(), "daemon detached");
    Ok(child.id())
}

/// Become the leader of a new session with no controlling terminal.
/// Fails if this process already leads a process group.
pub fn start_session() -> Result<u32> {
    let sid = setsid().map_err(io::Error::from)?;
    debug!(sid = sid.as_raw(), "started new session");
    Ok(sid.as_raw().unsigned_abs())
}
