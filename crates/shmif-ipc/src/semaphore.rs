//! Thin safe wrapper over POSIX named semaphores.
//!
//! `nix` has no wrapper for `sem_open`/`sem_timedwait`/named-semaphore
//! lifecycle, so this goes straight to `libc`, the way `core-terminal`
//! wraps a raw `crossterm` surface behind a type with a `Drop` impl
//! rather than leaving the FFI calls scattered through call sites.

use std::ffi::CString;
use std::ptr;
use std::time::Duration;

use crate::error::{Error, Result};

/// A named, process-shared semaphore. Three of these (video, audio,
/// event) synchronize one SHMIF segment.
pub struct NamedSemaphore {
    handle: *mut libc::sem_t,
    name: String,
}

// The underlying sem_t is documented safe for concurrent use by multiple
// threads/processes; only the handle pointer itself needs `Send`.
unsafe impl Send for NamedSemaphore {}

impl NamedSemaphore {
    /// Opens (creating if absent) a named semaphore initialized to
    /// `initial_value`. `name` must start with `/` and contain no further
    /// slashes, per `sem_overview(7)`.
    pub fn open(name: &str, initial_value: u32) -> Result<Self> {
        let cname = CString::new(name).expect("semaphore name has no interior NUL");
        let handle = unsafe {
            libc::sem_open(
                cname.as_ptr(),
                libc::O_CREAT,
                0o600u32,
                initial_value,
            )
        };
        if handle == libc::SEM_FAILED {
            return Err(Error::SemOpen { name: name.to_string(), source: std::io::Error::last_os_error() });
        }
        Ok(NamedSemaphore { handle, name: name.to_string() })
    }

    pub fn post(&self) -> Result<()> {
        let rc = unsafe { libc::sem_post(self.handle) };
        if rc != 0 {
            return Err(Error::SemOp(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    pub fn wait(&self) -> Result<()> {
        loop {
            let rc = unsafe { libc::sem_wait(self.handle) };
            if rc == 0 {
                return Ok(());
            }
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(Error::SemOp(err));
        }
    }

    pub fn try_wait(&self) -> Result<bool> {
        let rc = unsafe { libc::sem_trywait(self.handle) };
        if rc == 0 {
            return Ok(true);
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EAGAIN) {
            return Ok(false);
        }
        Err(Error::SemOp(err))
    }

    pub fn timed_wait(&self, timeout: Duration) -> Result<()> {
        let deadline = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        let mut now = deadline;
        // clock_gettime(CLOCK_REALTIME) as sem_timedwait requires an
        // absolute deadline.
        unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut now) };
        let mut abs = now;
        abs.tv_sec += timeout.as_secs() as libc::time_t;
        abs.tv_nsec += timeout.subsec_nanos() as i64;
        if abs.tv_nsec >= 1_000_000_000 {
            abs.tv_sec += 1;
            abs.tv_nsec -= 1_000_000_000;
        }
        loop {
            let rc = unsafe { libc::sem_timedwait(self.handle, &abs) };
            if rc == 0 {
                return Ok(());
            }
            let err = std::io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::ETIMEDOUT) => return Err(Error::TimedOut),
                _ => return Err(Error::SemOp(err)),
            }
        }
    }

    /// Removes the name from the filesystem namespace; existing open
    /// handles (in this or other processes) remain valid until closed.
    pub fn unlink(name: &str) -> Result<()> {
        let cname = CString::new(name).expect("semaphore name has no interior NUL");
        let rc = unsafe { libc::sem_unlink(cname.as_ptr()) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ENOENT) {
                return Ok(());
            }
            return Err(Error::SemUnlink { name: name.to_string(), source: err });
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        if self.handle != ptr::null_mut() {
            unsafe { libc::sem_close(self.handle) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!("/shmif-ipc-test-{}-{}", tag, std::process::id())
    }

    #[test]
    fn post_then_wait_succeeds() {
        let name = unique_name("post-wait");
        let sem = NamedSemaphore::open(&name, 0).expect("open");
        sem.post().expect("post");
        sem.wait().expect("wait");
        NamedSemaphore::unlink(&name).expect("unlink");
    }

    #[test]
    fn try_wait_false_when_not_posted() {
        let name = unique_name("try-wait");
        let sem = NamedSemaphore::open(&name, 0).expect("open");
        assert!(!sem.try_wait().expect("try_wait"));
        NamedSemaphore::unlink(&name).expect("unlink");
    }

    #[test]
    fn timed_wait_times_out() {
        let name = unique_name("timed-wait");
        let sem = NamedSemaphore::open(&name, 0).expect("open");
        let result = sem.timed_wait(Duration::from_millis(20));
        assert!(matches!(result, Err(Error::TimedOut)));
        NamedSemaphore::unlink(&name).expect("unlink");
    }
}
