//! POSIX shared memory object primitives (`shm_open`/`ftruncate`/`mmap`),
//! shared by both the client and server lifecycle crates so they can
//! never disagree on flags or mapping protections.

use std::os::fd::{AsRawFd, OwnedFd};

use nix::fcntl::OFlag;
use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};
use nix::sys::stat::Mode;
use nix::unistd::ftruncate;

use crate::error::{Error, Result};

/// Creates (or truncates) a POSIX shared memory object of `size` bytes
/// and returns the owning descriptor, unlinked from the name on the
/// caller's behalf only if `unlink_after` is set — the creator usually
/// wants to unlink immediately so a crash doesn't leak the name, while
/// still holding a valid mapping through the open descriptor.
pub fn create(name: &str, size: usize, unlink_after: bool) -> Result<OwnedFd> {
    let fd = nix::sys::mman::shm_open(
        name,
        OFlag::O_CREAT | OFlag::O_RDWR | OFlag::O_EXCL,
        Mode::S_IRUSR | Mode::S_IWUSR,
    )
    .map_err(Error::FdTransfer)?;
    ftruncate(&fd, size as i64).map_err(Error::FdTransfer)?;
    if unlink_after {
        let _ = nix::sys::mman::shm_unlink(name);
    }
    Ok(fd)
}

/// Opens an existing shared memory object for read/write mapping.
pub fn open_existing(name: &str) -> Result<OwnedFd> {
    nix::sys::mman::shm_open(name, OFlag::O_RDWR, Mode::empty()).map_err(Error::FdTransfer)
}

/// Maps the whole object. Returns the base address and length; the
/// caller is responsible for calling [`unmap`] exactly once.
///
/// # Safety
/// The caller must ensure `fd` refers to an object at least `size` bytes
/// long and must not read/write past `size` or after unmapping.
pub unsafe fn map(fd: &OwnedFd, size: usize) -> Result<*mut u8> {
    let ptr = mmap(
        None,
        std::num::NonZeroUsize::new(size).expect("nonzero mapping size"),
        ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
        MapFlags::MAP_SHARED,
        fd.as_raw_fd(),
        0,
    )
    .map_err(Error::FdTransfer)?;
    Ok(ptr as *mut u8)
}

/// # Safety
/// `ptr`/`size` must be exactly the pair returned by a prior [`map`] call
/// that has not already been unmapped.
pub unsafe fn unmap(ptr: *mut u8, size: usize) -> Result<()> {
    munmap(
        std::ptr::NonNull::new(ptr as *mut std::ffi::c_void).expect("mapped pointer is non-null"),
        size,
    )
    .map_err(Error::FdTransfer)
}

pub fn unlink(name: &str) {
    let _ = nix::sys::mman::shm_unlink(name);
}
