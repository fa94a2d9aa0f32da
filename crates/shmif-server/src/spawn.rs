//! Spawning a frameserver child process with an event-socket already
//! connected, per `arcan_frameserver_spawn_server()`: a connected
//! `socketpair` is handed down across `exec`, with the connection key
//! and mapping size passed through the environment.

use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command};

use crate::error::{Error, Result};

const ENV_SOCKIN_FD: &str = "ARCAN_SOCKIN_FD";
const ENV_CONNKEY: &str = "ARCAN_CONNKEY";
const ENV_SHMSIZE: &str = "ARCAN_SHMSIZE";

fn clear_cloexec(fd: RawFd) -> std::io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) };
    if rc < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Forks and execs `program`, connecting an event-socket end into the
/// child's environment before the exec happens. Returns the spawned
/// [`Child`] and the parent-held end of the socket.
pub fn spawn_server(shm_name: &str, shmsize: usize, program: &Path, args: &[String]) -> Result<(Child, UnixStream)> {
    let (parent_sock, child_sock) = UnixStream::pair().map_err(Error::Spawn)?;
    let child_fd = child_sock.as_raw_fd();

    let mut command = Command::new(program);
    command
        .args(args)
        .env(ENV_CONNKEY, shm_name)
        .env(ENV_SHMSIZE, shmsize.to_string())
        .env(ENV_SOCKIN_FD, child_fd.to_string());

    // SAFETY: only async-signal-safe calls (fcntl) run between fork and
    // exec in the child.
    unsafe {
        command.pre_exec(move || clear_cloexec(child_fd));
    }

    let child = command.spawn().map_err(Error::Spawn)?;
    drop(child_sock);

    tracing::info!(target: "shmif.server", shm_name, pid = child.id(), program = %program.display(), "frameserver spawned");
    Ok((child, parent_sock))
}
