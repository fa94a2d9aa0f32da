use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection point handshake failed: {0}")]
    Handshake(#[source] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] shmif_proto::Error),

    #[error(transparent)]
    Ipc(#[from] shmif_ipc::Error),

    #[error("shared memory mapping failed: {0}")]
    Map(#[source] nix::Error),

    #[error("the parent process is gone")]
    PeerGone,

    #[error("resize request timed out after {0:?}")]
    ResizeTimedOut(std::time::Duration),

    #[error("resize to {width}x{height} was refused by the parent")]
    ResizeRefused { width: u32, height: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
