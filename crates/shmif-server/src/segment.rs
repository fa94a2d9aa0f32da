//! Parent-side segment allocation and lifecycle: create the shared
//! memory and semaphores, hand them to a spawned or already-running
//! child, and service resize requests.
//!
//! Grounded on `shmalloc()` and `arcan_frameserver_resize()` in the
//! original implementation.

use std::os::fd::OwnedFd;
use std::sync::atomic::Ordering;

use shmif_ipc::NamedSemaphore;
use shmif_proto::layout::{self, ControlPage, VERSION_MAJOR, VERSION_MINOR};
use shmif_proto::ring::EventRing;

use crate::error::{Error, Result};

/// Declared role of a spawned child, mirroring the original
/// `arcan_frameserver_kinds` enum (narrowed to what a pure-IPC crate can
/// usefully distinguish; decoder/encoder/hijack specifics live above this
/// layer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameserverKind {
    Input,
    Output,
    Interactive,
    AvFeed,
    NetworkClient,
    NetworkServer,
}

fn sem_name(shm_name: &str, suffix: char) -> String {
    format!("{shm_name}{suffix}")
}

/// A shared segment allocated by the parent, before or after a child has
/// attached to it. `shmalloc()` equivalent.
pub struct ParentSegment {
    shm_fd: OwnedFd,
    pub(crate) shm_name: String,
    base: *mut u8,
    len: usize,
    vsem: NamedSemaphore,
    asem: NamedSemaphore,
    esem: NamedSemaphore,
    pub child_pid: Option<i32>,
    pub kind: FrameserverKind,
}

unsafe impl Send for ParentSegment {}

impl ParentSegment {
    /// Allocates a new segment sized for `w`x`h`, creates its three
    /// semaphores, and initializes the control page with the dead-man's
    /// switch set (the segment is considered live the moment it's
    /// allocated, even before a child has connected).
    pub fn allocate(shm_name: &str, w: u32, h: u32, kind: FrameserverKind) -> Result<ParentSegment> {
        let size = layout::segment_size(w, h);
        let shm_fd = shmif_ipc::shm::create(shm_name, size, false).map_err(Error::Ipc)?;
        let base = unsafe { shmif_ipc::shm::map(&shm_fd, size).map_err(Error::Ipc)? };

        unsafe {
            std::ptr::write_bytes(base, 0, size);
            let page = base as *mut ControlPage;
            (*page).version_major = VERSION_MAJOR;
            (*page).version_minor = VERSION_MINOR;
            (*page).cookie = layout::cookie();
            (*page).w = w;
            (*page).h = h;
            (*page).parent_pid = std::process::id();
            (*page).segment_size = size as u64;
        }
        let control = unsafe { &*(base as *const ControlPage) };
        control.dms.store(1, Ordering::Release);

        let vsem = NamedSemaphore::open(&sem_name(shm_name, 'v'), 0).map_err(Error::Ipc)?;
        let asem = NamedSemaphore::open(&sem_name(shm_name, 'a'), 0).map_err(Error::Ipc)?;
        let esem = NamedSemaphore::open(&sem_name(shm_name, 'e'), 0).map_err(Error::Ipc)?;

        tracing::info!(target: "shmif.server", shm_name, w, h, size, "segment allocated");

        Ok(ParentSegment {
            shm_fd,
            shm_name: shm_name.to_string(),
            base,
            len: size,
            vsem,
            asem,
            esem,
            child_pid: None,
            kind,
        })
    }

    fn control(&self) -> &ControlPage {
        unsafe { &*(self.base as *const ControlPage) }
    }

    pub fn bind_child(&mut self, pid: i32) {
        self.child_pid = Some(pid);
    }

    /// Posts the video (and, if `also_audio`, audio) semaphore, releasing
    /// a child blocked in `signal`. Call after having consumed the video
    /// (and, if `also_audio`, audio) plane for this cycle.
    pub fn acknowledge(&self, also_audio: bool) {
        let control = self.control();
        control.vready.store(0, Ordering::Release);
        let _ = self.vsem.post();
        if also_audio {
            control.aready.store(0, Ordering::Release);
            control.abufused.store(0, Ordering::Release);
            let _ = self.asem.post();
        }
    }

    pub fn video_ready(&self) -> bool {
        self.control().vready.load(Ordering::Acquire) != 0
    }

    pub fn dimensions(&self) -> (u32, u32) {
        let control = self.control();
        (unsafe { std::ptr::read(&control.w as *const u32) }, unsafe {
            std::ptr::read(&control.h as *const u32)
        })
    }

    pub fn video_plane(&self) -> &[u8] {
        let (w, h) = self.dimensions();
        let (video_offset, audio_offset) = layout::calc_offsets(w, h);
        unsafe { std::slice::from_raw_parts(self.base.add(video_offset), audio_offset - video_offset) }
    }

    pub fn outgoing_ring(&self) -> EventRing<'_> {
        EventRing::new(&self.control().parent_to_child)
    }

    pub fn incoming_ring(&self) -> EventRing<'_> {
        EventRing::new(&self.control().child_to_parent)
    }

    pub fn push_event(&self, event: &shmif_proto::Event) -> Result<()> {
        let raw = event.to_raw()?;
        self.outgoing_ring().try_enqueue(raw)?;
        let _ = self.esem.post();
        Ok(())
    }

    /// Services a pending resize request if one is flagged. A request
    /// exceeding the hard maximum is refused outright (no remap, a
    /// [`shmif_proto::TargetCommand::ReqFail`] event enqueued, `resized`
    /// left set so the client's wait does not mistake the refusal for
    /// success); a request for the current size is a no-op; otherwise
    /// the original's 20%-growth heuristic skips a remap when the new
    /// footprint still fits comfortably inside the current mapping:
    /// `sz < current && sz > 0.8 * current` keeps the old mapping as-is.
    pub fn service_resize(&mut self) -> Result<bool> {
        let control = self.control();
        if control.resized.load(Ordering::Acquire) == 0 {
            return Ok(false);
        }
        let (w, h) = self.dimensions();

        if w > layout::MAX_W || h > layout::MAX_H {
            tracing::warn!(target: "shmif.server", w, h, "resize refused: exceeds maximum dimensions");
            self.push_event(&shmif_proto::Event::Target(shmif_proto::TargetCommand::ReqFail))?;
            return Ok(false);
        }

        let needed = layout::segment_size(w, h);

        if needed == self.len {
            self.control().resized.store(0, Ordering::Release);
            tracing::debug!(target: "shmif.server", w, h, "resize to current size is a no-op");
            return Ok(true);
        }

        if needed < self.len && needed as f64 > 0.8 * self.len as f64 {
            tracing::debug!(target: "shmif.server", w, h, needed, current = self.len, "resize absorbed without remap");
        } else {
            unsafe { shmif_ipc::shm::unmap(self.base, self.len).map_err(Error::Ipc)? };
            nix::unistd::ftruncate(&self.shm_fd, needed as i64).map_err(Error::Alloc)?;
            self.base = unsafe { shmif_ipc::shm::map(&self.shm_fd, needed).map_err(Error::Ipc)? };
            self.len = needed;
            unsafe {
                (*(self.base as *mut ControlPage)).segment_size = needed as u64;
            }
            tracing::debug!(target: "shmif.server", w, h, needed, "resize remapped");
        }

        self.control().resized.store(0, Ordering::Release);
        Ok(true)
    }

    pub fn is_alive(&self) -> bool {
        self.control().dms.load(Ordering::Acquire) != 0
    }

    /// Clears the dead-man's switch and wakes anything blocked on a
    /// semaphore, e.g. once the watchdog has confirmed the child exited.
    pub fn mark_dead(&self) {
        self.control().dms.store(0, Ordering::Release);
        let _ = self.vsem.post();
        let _ = self.asem.post();
        let _ = self.esem.post();
    }
}

impl ParentSegment {
    /// Allocates a sibling segment bound to the same child process and
    /// announces it over this segment's event ring, per
    /// `arcan_frameserver_spawn_subsegment()`. Dimension hints are
    /// clamped to a sane minimum rather than rejected outright.
    pub fn spawn_subsegment(
        &self,
        input: bool,
        hint_w: u32,
        hint_h: u32,
        tag: i32,
        kind: FrameserverKind,
    ) -> Result<ParentSegment> {
        let w = hint_w.clamp(32, layout::MAX_W);
        let h = hint_h.clamp(32, layout::MAX_H);
        let sub_name = format!("{}_sub{}", self.shm_name, tag);

        let mut sub = ParentSegment::allocate(&sub_name, w, h, kind)?;
        sub.child_pid = self.child_pid;

        self.push_event(&shmif_proto::Event::Target(shmif_proto::TargetCommand::NewSegment {
            input,
            tag,
            key: sub_name,
        }))?;

        Ok(sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_name(tag: &str) -> String {
        format!("/shmif-server-test-segment-{}-{tag}", std::process::id())
    }

    #[test]
    fn spawn_subsegment_binds_child_and_announces_itself() {
        let name = test_name("spawn-subsegment");
        let mut parent = ParentSegment::allocate(&name, 64, 64, FrameserverKind::Interactive).unwrap();
        parent.bind_child(4242);

        let sub = parent.spawn_subsegment(true, 16, 16, 7, FrameserverKind::Input).unwrap();

        assert_eq!(sub.child_pid, Some(4242));
        // Hints below the minimum are clamped rather than rejected.
        assert_eq!(sub.dimensions(), (32, 32));
        assert_eq!(sub.shm_name, format!("{name}_sub7"));

        let raw = parent.outgoing_ring().poll().expect("NewSegment event enqueued");
        match shmif_proto::Event::from_raw(&raw) {
            Some(shmif_proto::Event::Target(shmif_proto::TargetCommand::NewSegment { input, tag, key })) => {
                assert!(input);
                assert_eq!(tag, 7);
                assert_eq!(key, sub.shm_name);
            }
            other => panic!("expected a NewSegment event, got {other:?}"),
        }
    }
}

impl Drop for ParentSegment {
    fn drop(&mut self) {
        self.mark_dead();
        unsafe {
            let _ = shmif_ipc::shm::unmap(self.base, self.len);
        }
        shmif_ipc::shm::unlink(&self.shm_name);
        let _ = NamedSemaphore::unlink(&sem_name(&self.shm_name, 'v'));
        let _ = NamedSemaphore::unlink(&sem_name(&self.shm_name, 'a'));
        let _ = NamedSemaphore::unlink(&sem_name(&self.shm_name, 'e'));
        tracing::info!(target: "shmif.server", shm_name = %self.shm_name, "segment dropped");
    }
}
