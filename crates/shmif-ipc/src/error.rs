use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("sem_open({name:?}) failed: {source}")]
    SemOpen { name: String, #[source] source: std::io::Error },

    #[error("semaphore operation failed: {0}")]
    SemOp(#[source] std::io::Error),

    #[error("sem_unlink({name:?}) failed: {source}")]
    SemUnlink { name: String, #[source] source: std::io::Error },

    #[error("semaphore wait timed out")]
    TimedOut,

    #[error("file descriptor transfer failed: {0}")]
    FdTransfer(#[source] nix::Error),

    #[error("peer closed the socket before a descriptor arrived")]
    NoDescriptor,
}

pub type Result<T> = std::result::Result<T, Error>;
