//! Parent-side half of SHMIF: allocate segments, spawn or bind
//! frameserver children, service resize requests, watch for child death,
//! and run the non-authoritative connection point.

pub mod connpoint;
pub mod error;
pub mod segment;
pub mod spawn;
pub mod watchdog;

pub use error::{Error, Result};
pub use segment::{FrameserverKind, ParentSegment};
pub use spawn::spawn_server;
pub use watchdog::Watchdog;
