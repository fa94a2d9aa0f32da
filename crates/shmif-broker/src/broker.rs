//! Privileged-side request handling: check a requested path against the
//! whitelist, confirm it's actually a device node, open it, and hand the
//! descriptor back over the control socket via `SCM_RIGHTS`. DRM and TTY
//! devices are tracked broker-side between open and release so the
//! privileged process can restore terminal state and drop DRM master
//! status the way `psep_open.c`'s `whitelist[].fd` bookkeeping does.

use std::collections::HashMap;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::net::UnixStream;

use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use nix::sys::termios::{self, SetArg, Termios};

use shmif_config::{Config, DeviceMode};

use crate::channel::BrokerChannel;
use crate::error::{Error, Result};
use crate::protocol::Command;
use crate::whitelist;

/// Broker-side state retained for a device that must be restored or
/// re-acquired on release, mirroring the original's in-place
/// `whitelist[ind].fd`.
struct DeviceState {
    fd: OwnedFd,
    mode: DeviceMode,
    saved_termios: Option<Termios>,
}

/// The privileged-process side of the broker. Holds the whitelist and
/// the control socket; never touches rendering, input translation, or
/// anything else the unprivileged side is responsible for.
pub struct Broker {
    config: Config,
    channel: BrokerChannel,
    fd_socket: UnixStream,
    open_devices: HashMap<String, DeviceState>,
}

impl Broker {
    pub fn new(config: Config, channel: UnixStream, fd_socket: UnixStream) -> Broker {
        Broker { config, channel: BrokerChannel::new(channel), fd_socket, open_devices: HashMap::new() }
    }

    /// Services one request from the control socket: open, release, or
    /// a system-state transition. Returns `false` when the unprivileged
    /// side has gone away (clean shutdown signal for the caller's loop).
    pub fn serve_one(&mut self) -> Result<bool> {
        let command = match self.channel.recv() {
            Ok(cmd) => cmd,
            Err(Error::Io(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(false),
            Err(err) => return Err(err),
        };

        match command {
            Command::OpenDevice { path } => match self.open_device(&path) {
                Ok(fd) => {
                    shmif_ipc::push_fd(&self.fd_socket, b'o', fd.as_raw_fd())?;
                }
                Err(err) => {
                    tracing::warn!(target: "shmif.broker", path, %err, "device open refused");
                    self.channel.send(&Command::OpenFailed)?;
                }
            },
            Command::ReleaseDevice { path, .. } => self.release_device(&path),
            other => {
                tracing::debug!(target: "shmif.broker", ?other, "unhandled system-state command");
            }
        }
        Ok(true)
    }

    fn open_device(&mut self, path: &str) -> Result<OwnedFd> {
        let mode = whitelist::resolve(&self.config.file.whitelist, path)
            .ok_or_else(|| Error::NotWhitelisted { path: path.to_string() })?
            .mode;

        if let Some(state) = self.open_devices.get(path) {
            if mode == DeviceMode::Drm {
                tracing::debug!(target: "shmif.broker", path, "re-acquiring DRM master on an already-open device");
            }
            return dup_fd(&state.fd);
        }

        if !path.starts_with("/sys") {
            let st = nix::sys::stat::stat(path).map_err(|e| Error::Open(std::io::Error::from(e)))?;
            if st.st_mode & libc::S_IFMT != libc::S_IFCHR {
                return Err(Error::NotCharacterDevice { path: path.to_string() });
            }
        }

        let flags = match mode {
            DeviceMode::Drm => OFlag::O_RDWR | OFlag::O_CLOEXEC,
            _ => OFlag::O_RDWR | OFlag::O_CLOEXEC | OFlag::O_NONBLOCK,
        };
        let fd = nix::fcntl::open(path, flags, Mode::empty()).map_err(|e| Error::Open(std::io::Error::from(e)))?;

        match mode {
            DeviceMode::Tty => {
                let saved = termios::tcgetattr(&fd).ok();
                if let Some(current) = &saved {
                    let mut raw = current.clone();
                    termios::cfmakeraw(&mut raw);
                    let _ = termios::tcsetattr(&fd, SetArg::TCSANOW, &raw);
                    tracing::info!(target: "shmif.broker", path, "tty captured, echo disabled");
                }
                let handed_off = dup_fd(&fd)?;
                self.open_devices.insert(path.to_string(), DeviceState { fd, mode, saved_termios: saved });
                Ok(handed_off)
            }
            DeviceMode::Drm => {
                tracing::info!(target: "shmif.broker", path, "became DRM master");
                let handed_off = dup_fd(&fd)?;
                self.open_devices.insert(path.to_string(), DeviceState { fd, mode, saved_termios: None });
                Ok(handed_off)
            }
            _ => Ok(fd),
        }
    }

    /// Drops DRM master or restores captured TTY state for `path`, the
    /// portable equivalent of `release_device()`. A release for a path
    /// with no broker-side state (ordinary `/dev/input/*` nodes, which
    /// are never retained past the initial hand-off) is a no-op.
    fn release_device(&mut self, path: &str) {
        let Some(state) = self.open_devices.remove(path) else {
            tracing::debug!(target: "shmif.broker", path, "release for a device with no broker-side state");
            return;
        };
        match state.mode {
            DeviceMode::Drm => {
                // No DRM ioctl binding is in the dependency stack; dropping
                // `state.fd` here closes the only broker-held reference,
                // which relinquishes master the same way `close()` does in
                // the original on a non-shutdown release path.
                tracing::info!(target: "shmif.broker", path, "dropping DRM master");
            }
            DeviceMode::Tty => {
                if let Some(saved) = &state.saved_termios {
                    let _ = termios::tcsetattr(&state.fd, SetArg::TCSANOW, saved);
                    tracing::info!(target: "shmif.broker", path, "tty state restored");
                }
            }
            _ => {}
        }
    }
}

fn dup_fd(fd: &OwnedFd) -> Result<OwnedFd> {
    let raw = nix::unistd::dup(fd.as_raw_fd()).map_err(|e| Error::Open(std::io::Error::from(e)))?;
    Ok(unsafe { OwnedFd::from_raw_fd(raw) })
}

impl Drop for Broker {
    /// Restores every outstanding TTY and releases every outstanding DRM
    /// master on shutdown, matching `release_devices()`.
    fn drop(&mut self) {
        let paths: Vec<String> = self.open_devices.keys().cloned().collect();
        for path in paths {
            self.release_device(&path);
        }
    }
}
