use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Protocol(#[from] shmif_proto::Error),

    #[error(transparent)]
    Ipc(#[from] shmif_ipc::Error),

    #[error("shared memory allocation failed: {0}")]
    Alloc(#[source] nix::Error),

    #[error("spawning the child process failed: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("resize to {width}x{height} was refused: {reason}")]
    ResizeRefused { width: u32, height: u32, reason: &'static str },

    #[error("connection point authentication failed")]
    AuthFailed,

    #[error("connection point key exceeds the configured limit of {limit} bytes")]
    KeyTooLong { limit: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
