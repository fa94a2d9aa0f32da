//! The guard thread: a client-side liveness poller that notices when the
//! parent process has died and unblocks anything waiting on a
//! synchronization semaphore, rather than hanging forever.
//!
//! Mirrors `guard_thread()` in the original implementation: poll every
//! five seconds with `kill(pid, 0)`, and on death clear the dead-man's
//! switch and post every semaphore so a blocked `signal`/`resize` call
//! returns instead of stalling.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use nix::sys::signal::kill;
use nix::unistd::Pid;

use shmif_ipc::NamedSemaphore;

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Raw pointer to the segment's dead-man's-switch word. The guard thread
/// is the only writer once spawned; the owning [`crate::segment::Segment`]
/// only reads it.
pub(crate) struct DmsPtr(pub *const AtomicU32);
unsafe impl Send for DmsPtr {}

pub struct GuardHandle {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl GuardHandle {
    pub fn spawn(
        dms: DmsPtr,
        parent_pid: i32,
        vsem: Arc<NamedSemaphore>,
        asem: Arc<NamedSemaphore>,
        esem: Arc<NamedSemaphore>,
    ) -> GuardHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = stop.clone();

        let handle = std::thread::spawn(move || {
            let dms = dms;
            loop {
                std::thread::sleep(POLL_INTERVAL);
                if stop_thread.load(Ordering::Relaxed) {
                    return;
                }
                if kill(Pid::from_raw(parent_pid), None).is_ok() {
                    continue;
                }

                tracing::warn!(target: "shmif.client", parent_pid, "parent process is gone, releasing waiters");
                unsafe { (*dms.0).store(0, Ordering::Release) };
                let _ = vsem.post();
                let _ = asem.post();
                let _ = esem.post();

                std::thread::sleep(GRACE_PERIOD);
                if !stop_thread.load(Ordering::Relaxed) {
                    tracing::error!(target: "shmif.client", "segment not released after parent death, exiting");
                    std::process::exit(1);
                }
                return;
            }
        });

        GuardHandle { stop, handle: Some(handle) }
    }
}

impl Drop for GuardHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        // Don't block teardown on the thread's 5-second poll interval;
        // it will see the flag on its next wake and exit on its own.
        self.handle.take();
    }
}
