//! Low-level synchronization and descriptor-passing primitives: named
//! POSIX semaphores and `SCM_RIGHTS` file descriptor transfer over
//! connected `AF_UNIX` sockets.

pub mod error;
pub mod fdpass;
pub mod semaphore;
pub mod shm;

pub use error::{Error, Result};
pub use fdpass::{pull_fd, push_fd};
pub use semaphore::NamedSemaphore;
