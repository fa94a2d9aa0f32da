//! Forwards VT-switch and shutdown signals to the unprivileged side on a
//! dedicated thread, never from signal-handler context, using
//! `signal-hook`'s self-pipe-backed iterator.
//!
//! Also exposes a debounced hotplug channel: the original broker rate
//! limits GPU connector hotplug notifications coming off a netlink
//! socket. The netlink parsing itself is Linux kernel-ABI wiring outside
//! this crate's scope; what's implemented and tested here is the
//! portable debounce policy any hotplug source feeds into.

use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use signal_hook::consts::{SIGTERM, SIGUSR1, SIGUSR2};
use signal_hook::iterator::Signals;

use crate::protocol::Command;

/// Spawns a thread translating `SIGUSR1`/`SIGUSR2`/`SIGTERM` into the
/// corresponding system-state command, forwarded on `tx`. `SIGUSR1` is
/// the VT-release request, `SIGUSR2` the VT-acquire confirmation,
/// matching the original's use of user signals for VT switch
/// coordination with the kernel console subsystem.
pub fn spawn_vt_forwarder(tx: Sender<Command>) -> std::io::Result<std::thread::JoinHandle<()>> {
    let mut signals = Signals::new([SIGUSR1, SIGUSR2, SIGTERM])?;
    Ok(std::thread::spawn(move || {
        for signal in signals.forever() {
            let command = match signal {
                SIGUSR1 => Command::SystemStateRelease,
                SIGUSR2 => Command::SystemStateAcquire,
                SIGTERM => Command::SystemStateTerminate,
                _ => continue,
            };
            if tx.send(command).is_err() {
                return;
            }
        }
    }))
}

/// Collapses a burst of hotplug notifications arriving within `window`
/// of each other into a single emitted event, so a connector flapping at
/// boot doesn't flood the unprivileged side with redundant state
/// refreshes.
pub struct HotplugDebouncer {
    window: Duration,
    last_emit: Option<Instant>,
}

impl HotplugDebouncer {
    pub fn new(window: Duration) -> HotplugDebouncer {
        HotplugDebouncer { window, last_emit: None }
    }

    /// Call once per raw hotplug notification; returns `true` if this
    /// one should actually be forwarded.
    pub fn admit(&mut self, now: Instant) -> bool {
        match self.last_emit {
            Some(last) if now.duration_since(last) < self.window => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_a_burst_within_the_window() {
        let mut debouncer = HotplugDebouncer::new(Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(debouncer.admit(t0));
        assert!(!debouncer.admit(t0 + Duration::from_millis(10)));
        assert!(!debouncer.admit(t0 + Duration::from_millis(99)));
    }

    #[test]
    fn admits_again_after_the_window_elapses() {
        let mut debouncer = HotplugDebouncer::new(Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(debouncer.admit(t0));
        assert!(debouncer.admit(t0 + Duration::from_millis(150)));
    }
}
