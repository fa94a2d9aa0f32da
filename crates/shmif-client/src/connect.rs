//! Establishing a connection: either inheriting an already-negotiated
//! segment from the environment (the common case — a parent spawned this
//! process and set `ARCAN_CONNKEY`/`ARCAN_SHMSIZE`), or actively dialing a
//! non-authoritative connection point and running the pre-shared-key
//! challenge.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

use crate::error::{Error, Result};

pub const ENV_CONNKEY: &str = "ARCAN_CONNKEY";
pub const ENV_SHMSIZE: &str = "ARCAN_SHMSIZE";

/// Parameters needed to acquire a segment, resolved either from the
/// environment or from a connection-point handshake.
pub struct ConnectionParams {
    pub shm_key: String,
    pub shm_size: usize,
}

/// Reads `ARCAN_CONNKEY`/`ARCAN_SHMSIZE` set by a parent that spawned
/// this process directly (the authoritative path — no socket handshake
/// required, the segment already exists under the given key).
pub fn from_environment() -> Option<ConnectionParams> {
    let shm_key = std::env::var(ENV_CONNKEY).ok()?;
    let shm_size = std::env::var(ENV_SHMSIZE).ok()?.parse().ok()?;
    Some(ConnectionParams { shm_key, shm_size })
}

/// Dials a listening, non-authoritative connection point at `path` and
/// runs the pre-shared-key challenge: send `key\n`, then read the
/// allocated segment key terminated by `\n`. Returns the open socket
/// (kept around as the client's event-socket) and the resolved
/// parameters.
pub fn connect_to_connpoint(path: &Path, key: &str) -> Result<(UnixStream, ConnectionParams)> {
    let mut stream = UnixStream::connect(path).map_err(Error::Handshake)?;
    stream.write_all(key.as_bytes()).map_err(Error::Handshake)?;
    stream.write_all(b"\n").map_err(Error::Handshake)?;

    let mut reader = BufReader::new(stream.try_clone().map_err(Error::Handshake)?);
    let mut line = String::new();
    reader.read_line(&mut line).map_err(Error::Handshake)?;
    let shm_key = line.trim_end_matches('\n').to_string();
    if shm_key.is_empty() {
        return Err(Error::Handshake(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "connection point rejected the key",
        )));
    }

    let shm_size: usize = std::env::var(ENV_SHMSIZE)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(shmif_proto::layout::segment_size(32, 32));

    Ok((stream, ConnectionParams { shm_key, shm_size }))
}
