//! Passing a file descriptor across a connected `AF_UNIX` socket via
//! `SCM_RIGHTS` ancillary data, with a one-byte tag carried alongside it.
//!
//! Grounded on the same technique used for PTY handoff over a broker
//! socket in other SCM_RIGHTS-based Rust tooling: a `sendmsg`/`recvmsg`
//! pair with a single control message, one descriptor at a time.

use std::io::{IoSlice, IoSliceMut};
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;

use nix::cmsg_space;
use nix::sys::socket::{recvmsg, sendmsg, ControlMessage, ControlMessageOwned, MsgFlags};

use crate::error::{Error, Result};

/// Sends `tag` as a one-byte payload with `fd` attached as ancillary
/// data. The receiving end gets a duplicate descriptor; `fd` is not
/// closed by this call.
pub fn push_fd(stream: &UnixStream, tag: u8, fd: RawFd) -> Result<()> {
    let iov = [IoSlice::new(std::slice::from_ref(&tag))];
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    let fds = [borrowed.as_raw_fd()];
    let cmsg = [ControlMessage::ScmRights(&fds)];
    sendmsg::<()>(stream.as_raw_fd(), &iov, &cmsg, MsgFlags::empty(), None).map_err(Error::FdTransfer)?;
    Ok(())
}

/// Blocks until a tagged descriptor arrives, returning the tag byte and
/// the received (owned) descriptor.
pub fn pull_fd(stream: &UnixStream) -> Result<(u8, OwnedFd)> {
    let mut tag = [0u8];
    let mut iov = [IoSliceMut::new(&mut tag)];
    let mut cmsg_buffer = cmsg_space!([RawFd; 1]);

    let msg = recvmsg::<()>(stream.as_raw_fd(), &mut iov, Some(&mut cmsg_buffer), MsgFlags::empty())
        .map_err(Error::FdTransfer)?;

    for cmsg in msg.cmsgs().map_err(Error::FdTransfer)? {
        if let ControlMessageOwned::ScmRights(fds) = cmsg {
            if let Some(&raw) = fds.first() {
                // SAFETY: recvmsg just handed us ownership of this descriptor.
                let owned = unsafe { OwnedFd::from_raw_fd(raw) };
                return Ok((tag[0], owned));
            }
        }
    }
    Err(Error::NoDescriptor)
}

use std::os::fd::FromRawFd;

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::IntoRawFd;

    #[test]
    fn round_trips_a_descriptor_and_tag() {
        let (a, b) = UnixStream::pair().expect("socketpair");
        let file = tempfile::tempfile().expect("tempfile");
        let fd = file.into_raw_fd();

        push_fd(&a, 42, fd).expect("push");
        unsafe { libc::close(fd) };

        let (tag, received) = pull_fd(&b).expect("pull");
        assert_eq!(tag, 42);
        assert!(received.as_raw_fd() >= 0);
    }
}
