use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("device path {path:?} is not covered by the whitelist")]
    NotWhitelisted { path: String },

    #[error("device open failed: {0}")]
    Open(#[source] std::io::Error),

    #[error("device path {path:?} is not a character device")]
    NotCharacterDevice { path: String },

    #[error(transparent)]
    Ipc(#[from] shmif_ipc::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed broker packet")]
    Malformed,
}

pub type Result<T> = std::result::Result<T, Error>;
