use thiserror::Error;

/// Errors surfaced by the wire layout and event ring. Protocol errors are
/// fatal for the segment they're raised on; ring errors are per-call and
/// leave the segment usable.
#[derive(Debug, Error)]
pub enum Error {
    #[error("segment cookie mismatch: local {local:#x}, remote {remote:#x}")]
    CookieMismatch { local: u64, remote: u64 },

    #[error("segment version mismatch: local {local_major}.{local_minor}, remote {remote_major}.{remote_minor}")]
    VersionMismatch {
        local_major: u16,
        local_minor: u16,
        remote_major: u16,
        remote_minor: u16,
    },

    #[error("event ring is full")]
    RingFull,

    #[error("event ring is empty")]
    RingEmpty,

    #[error("peer is gone: dead-man's switch tripped while blocked on the ring")]
    PeerGone,

    #[error(transparent)]
    Ipc(#[from] shmif_ipc::Error),

    #[error("string field exceeds {limit} bytes and could not be truncated to valid UTF-8")]
    StringTooLong { limit: usize },

    #[error("requested dimensions {width}x{height} exceed the maximum of {max_width}x{max_height}")]
    DimensionsTooLarge {
        width: u32,
        height: u32,
        max_width: u32,
        max_height: u32,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
