//! Client-side segment lifecycle: acquire an already-allocated shared
//! segment, signal frames, request resizes, and tear down cleanly.

use std::os::fd::OwnedFd;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bitflags::bitflags;

use shmif_ipc::NamedSemaphore;
use shmif_proto::layout::{self, ControlPage, MAX_H, MAX_W, VERSION_MAJOR, VERSION_MINOR};
use shmif_proto::ring::EventRing;

use crate::error::{Error, Result};
use crate::guard::{DmsPtr, GuardHandle};

/// The kind of client a segment declares itself as at `acquire` time,
/// matching the spec's archetype concept (media/game/terminal/
/// network-client).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Archetype {
    Media,
    Game,
    Terminal,
    NetworkClient,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SignalMask: u8 {
        const VIDEO = 1 << 0;
        const AUDIO = 1 << 1;
    }
}

/// Blocking behavior of [`Segment::signal`], matching `arcan_shmif_signal`'s
/// `SIGVID_FORCE`/`SIGVID_NONE`/`SIGVID_ONCE` modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalMode {
    /// Always wait for the parent to acknowledge the requested planes.
    Force,
    /// Fire and forget: mark the planes ready and return immediately.
    None,
    /// Return immediately without re-signaling if a previous signal on any
    /// requested plane is still unacknowledged; otherwise behaves as `Force`.
    Once,
}

fn sem_name(shm_name: &str, suffix: char) -> String {
    format!("{shm_name}{suffix}")
}

/// A mapped, synchronized shared segment. Dropping it unmaps the region
/// and stops the guard thread; it does not unlink the shared memory or
/// semaphore names, which only the allocating parent owns.
pub struct Segment {
    shm_fd: OwnedFd,
    shm_name: String,
    base: *mut u8,
    len: usize,
    vsem: Arc<NamedSemaphore>,
    asem: Arc<NamedSemaphore>,
    esem: Arc<NamedSemaphore>,
    guard: GuardHandle,
    archetype: Archetype,
}

// `base` only ever aliases the shared mapping, which is by definition
// shared across processes; no thread-confinement is assumed of it.
unsafe impl Send for Segment {}

impl Segment {
    /// Maps an existing segment identified by `shm_name`, validates its
    /// cookie and version against this build, and spawns the guard
    /// thread. `shmsize` is the size agreed during the handshake.
    pub fn acquire(shm_name: &str, shmsize: usize, parent_pid: i32, archetype: Archetype) -> Result<Segment> {
        let shm_fd = shmif_ipc::shm::open_existing(shm_name).map_err(Error::Ipc)?;
        let base = unsafe { shmif_ipc::shm::map(&shm_fd, shmsize).map_err(Error::Ipc)? };

        let control = unsafe { &*(base as *const ControlPage) };
        if control.version_major != VERSION_MAJOR || control.version_minor != VERSION_MINOR {
            return Err(shmif_proto::Error::VersionMismatch {
                local_major: VERSION_MAJOR,
                local_minor: VERSION_MINOR,
                remote_major: control.version_major,
                remote_minor: control.version_minor,
            }
            .into());
        }
        let expected_cookie = layout::cookie();
        if control.cookie != expected_cookie {
            return Err(shmif_proto::Error::CookieMismatch { local: expected_cookie, remote: control.cookie }.into());
        }

        let vsem = Arc::new(NamedSemaphore::open(&sem_name(shm_name, 'v'), 0).map_err(Error::Ipc)?);
        let asem = Arc::new(NamedSemaphore::open(&sem_name(shm_name, 'a'), 0).map_err(Error::Ipc)?);
        let esem = Arc::new(NamedSemaphore::open(&sem_name(shm_name, 'e'), 0).map_err(Error::Ipc)?);

        let dms_ptr = DmsPtr(&control.dms as *const _);
        let guard = GuardHandle::spawn(dms_ptr, parent_pid, vsem.clone(), asem.clone(), esem.clone());

        tracing::info!(target: "shmif.client", shm_name, shmsize, parent_pid, ?archetype, "segment acquired");

        Ok(Segment {
            shm_fd,
            shm_name: shm_name.to_string(),
            base,
            len: shmsize,
            vsem,
            asem,
            esem,
            guard,
            archetype,
        })
    }

    fn control(&self) -> &ControlPage {
        unsafe { &*(self.base as *const ControlPage) }
    }

    pub fn archetype(&self) -> Archetype {
        self.archetype
    }

    pub fn is_alive(&self) -> bool {
        self.control().dms.load(Ordering::Acquire) != 0
    }

    pub fn dimensions(&self) -> (u32, u32) {
        let control = self.control();
        (
            unsafe { std::ptr::read(&control.w as *const u32) },
            unsafe { std::ptr::read(&control.h as *const u32) },
        )
    }

    /// Byte offsets, from the base of the mapping, of the video and
    /// audio planes for the segment's current dimensions.
    pub fn plane_offsets(&self) -> (usize, usize) {
        let (w, h) = self.dimensions();
        layout::calc_offsets(w, h)
    }

    /// Raw byte access to the video plane. Valid until the next resize.
    pub fn video_plane(&self) -> &[u8] {
        let (video_offset, audio_offset) = self.plane_offsets();
        let len = audio_offset - video_offset;
        unsafe { std::slice::from_raw_parts(self.base.add(video_offset), len) }
    }

    pub fn video_plane_mut(&mut self) -> &mut [u8] {
        let (video_offset, audio_offset) = self.plane_offsets();
        let len = audio_offset - video_offset;
        unsafe { std::slice::from_raw_parts_mut(self.base.add(video_offset), len) }
    }

    fn outgoing_ring(&self) -> EventRing<'_> {
        EventRing::new(&self.control().child_to_parent)
    }

    pub fn incoming_ring(&self) -> EventRing<'_> {
        EventRing::new(&self.control().parent_to_child)
    }

    pub fn push_event(&self, event: &shmif_proto::Event) -> Result<()> {
        let raw = event.to_raw()?;
        self.outgoing_ring().try_enqueue(raw)?;
        self.esem.post().map_err(Error::Ipc)?;
        Ok(())
    }

    /// Marks the requested planes ready and, depending on `mode`, blocks
    /// until the parent has consumed them (or until the dead-man's switch
    /// trips, in which case this returns [`Error::PeerGone`] instead of
    /// hanging). A combined mask sets video ready then audio ready, and
    /// (when waiting) waits on the audio semaphore before the video one,
    /// matching `arcan_shmif_signal`.
    pub fn signal(&self, mask: SignalMask, mode: SignalMode) -> Result<()> {
        let control = self.control();

        if mode == SignalMode::Once {
            let video_pending = mask.contains(SignalMask::VIDEO) && control.vready.load(Ordering::Acquire) != 0;
            let audio_pending = mask.contains(SignalMask::AUDIO) && control.aready.load(Ordering::Acquire) != 0;
            if video_pending || audio_pending {
                return Ok(());
            }
        }

        if mask.contains(SignalMask::VIDEO) {
            control.vready.store(1, Ordering::Release);
        }
        if mask.contains(SignalMask::AUDIO) {
            control.aready.store(1, Ordering::Release);
        }

        if mode == SignalMode::None {
            return Ok(());
        }

        if mask.contains(SignalMask::AUDIO) {
            self.asem.wait().map_err(Error::Ipc)?;
        }
        if mask.contains(SignalMask::VIDEO) {
            self.vsem.wait().map_err(Error::Ipc)?;
        }

        if control.dms.load(Ordering::Acquire) == 0 {
            return Err(Error::PeerGone);
        }
        Ok(())
    }

    /// Requests a new size and blocks (bounded by `timeout`) until the
    /// parent services it, re-mapping the segment if its backing size
    /// changed.
    pub fn resize(&mut self, width: u32, height: u32, timeout: Duration) -> Result<()> {
        if width > MAX_W || height > MAX_H {
            return Err(Error::ResizeRefused { width, height });
        }

        {
            let control_ptr = self.base as *mut ControlPage;
            unsafe {
                std::ptr::write(&mut (*control_ptr).w, width);
                std::ptr::write(&mut (*control_ptr).h, height);
            }
            self.control().resized.store(1, Ordering::Release);
        }

        let deadline = Instant::now() + timeout;
        loop {
            if self.control().resized.load(Ordering::Acquire) == 0 {
                break;
            }
            if self.control().dms.load(Ordering::Acquire) == 0 {
                return Err(Error::PeerGone);
            }
            if Instant::now() >= deadline {
                return Err(Error::ResizeTimedOut(timeout));
            }
            std::thread::sleep(Duration::from_millis(4));
        }

        let new_size = self.control().segment_size as usize;
        if new_size != self.len {
            unsafe { shmif_ipc::shm::unmap(self.base, self.len).map_err(Error::Ipc)? };
            self.base = unsafe { shmif_ipc::shm::map(&self.shm_fd, new_size).map_err(Error::Ipc)? };
            self.len = new_size;
        }

        tracing::debug!(target: "shmif.client", width, height, new_size, "resize serviced");
        Ok(())
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        unsafe {
            let _ = shmif_ipc::shm::unmap(self.base, self.len);
        }
        tracing::info!(target: "shmif.client", shm_name = %self.shm_name, "segment dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use shmif_server::{FrameserverKind, ParentSegment};

    #[test]
    fn signal_mask_combines() {
        let mask = SignalMask::VIDEO | SignalMask::AUDIO;
        assert!(mask.contains(SignalMask::VIDEO));
        assert!(mask.contains(SignalMask::AUDIO));
    }

    /// A `signal` blocked waiting for acknowledgment must not hang
    /// forever once the peer is gone: marking the segment dead posts
    /// every semaphore and clears the dead-man's switch, and a waiter
    /// woken that way must see [`Error::PeerGone`] rather than mistaking
    /// the wakeup for a real acknowledgment.
    #[test]
    fn signal_returns_peer_gone_once_the_segment_is_marked_dead() {
        let name = format!("/shmif-client-test-peer-death-{}", std::process::id());
        let parent = ParentSegment::allocate(&name, 32, 32, FrameserverKind::Interactive).unwrap();

        let client = Segment::acquire(&name, layout::segment_size(32, 32), std::process::id() as i32, Archetype::Game)
            .unwrap();

        parent.mark_dead();

        let result = client.signal(SignalMask::VIDEO, SignalMode::Force);
        assert!(matches!(result, Err(Error::PeerGone)), "expected PeerGone, got {result:?}");
    }
}
