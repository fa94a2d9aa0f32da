//! Reaps a spawned child and reports its exit, escalating to `SIGKILL`
//! if it doesn't exit on its own. Mirrors `nanny_thread()`: ten
//! one-second `waitpid(WNOHANG)` polls, then a kill and a final blocking
//! wait.

use std::thread::JoinHandle;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

const POLL_ATTEMPTS: u32 = 10;
const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct Watchdog {
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Spawns the reaper thread for `pid`. `on_exit` is called exactly
    /// once, from the watchdog thread, once the child has been reaped.
    pub fn spawn(pid: i32, on_exit: impl FnOnce() + Send + 'static) -> Watchdog {
        let handle = std::thread::spawn(move || {
            let target = Pid::from_raw(pid);

            for _ in 0..POLL_ATTEMPTS {
                match waitpid(target, Some(WaitPidFlag::WNOHANG)) {
                    Ok(WaitStatus::StillAlive) => std::thread::sleep(POLL_INTERVAL),
                    Ok(_) => {
                        on_exit();
                        return;
                    }
                    Err(nix::errno::Errno::ECHILD) => {
                        on_exit();
                        return;
                    }
                    Err(err) => {
                        tracing::warn!(target: "shmif.server", pid, %err, "waitpid failed, retrying");
                        std::thread::sleep(POLL_INTERVAL);
                    }
                }
            }

            tracing::warn!(target: "shmif.server", pid, "child unresponsive after grace period, sending SIGKILL");
            let _ = kill(target, Signal::SIGKILL);
            let _ = waitpid(target, None);
            on_exit();
        });

        Watchdog { handle: Some(handle) }
    }

    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
