//! Socket client used by the `suggest` and `record` subcommands.

use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::daemon::protocol::Request;
use crate::error::{BshError, Result};

const WRITE_TIMEOUT: Duration = Duration::from_secs(2);
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Send one request and return the daemon's raw reply.
pub fn send(socket_path: &Path, request: &Request) -> Result<String> {
    let payload = request.encode()?;

    let mut stream = UnixStream::connect(socket_path).map_err(|e| {
        debug!(socket = %socket_path.display(), error = %e, "connect failed");
        BshError::DaemonUnavailable(socket_path.display().to_string())
    })?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;

    stream.write_all(&payload)?;
    stream.flush()?;
    stream.shutdown(Shutdown::Write)?;

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply)?;
    Ok(String::from_utf8_lossy(&reply).into_owned())
}

/// True when something accepts connections on `socket_path`.
pub fn is_daemon_running(socket_path: &Path) -> bool {
    socket_path.exists() && UnixStream::connect(socket_path).is_ok()
}
