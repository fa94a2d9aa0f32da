//! Wire-level types shared by every side of a SHMIF connection: the fixed
//! control-page layout, the cookie that detects layout skew, the event
//! ring, and the typed events carried over it.
//!
//! This crate touches the filesystem only indirectly, through
//! `shmif-ipc`'s `NamedSemaphore`, to pair the ring with the semaphore
//! its blocking `enqueue`/`wait` operations wait on. `shmif-client` and
//! `shmif-server` build the rest of the transport (segment mapping,
//! handshakes, process lifecycle) on top of it.

pub mod error;
pub mod event;
pub mod layout;
pub mod ring;

pub use error::{Error, Result};
pub use event::{Event, ExternalNotice, FrameserverStatus, InputEvent, RawEvent, TargetCommand};
pub use layout::ControlPage;
pub use ring::{EventRing, EventRingHeader, EVENT_RING_SIZE};
