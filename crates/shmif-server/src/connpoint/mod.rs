//! The non-authoritative connection point: a listening socket external
//! processes dial into, authenticated by a pre-shared key compared in
//! constant time, per `socketpoll()`/`socketverify()` in the original
//! implementation.

use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Compares two byte strings without a data-dependent early exit, per
/// `memcmp_nodep()` in the original broker: every byte is visited
/// regardless of where the first mismatch is, so timing doesn't leak how
/// much of the key the caller guessed correctly.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        // Length itself isn't secret (the caller already knows the
        // expected key length), but we still compare a same-length
        // dummy so callers that branch on the boolean alone see uniform
        // cost across call sites.
        let mut acc: u8 = 1;
        for (&x, &y) in a.iter().zip(a.iter()) {
            acc |= x ^ y;
        }
        let _ = b;
        return false;
    }
    let mut acc: u8 = 0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// A bound, listening connection point.
pub struct ConnectionPoint {
    listener: UnixListener,
    path: PathBuf,
    key: Vec<u8>,
    keylimit: usize,
}

impl ConnectionPoint {
    /// Binds a connection point at `path`. Any stale socket file at that
    /// path is removed first, same as the original unlinking before
    /// bind; `path` is unlinked again once this value is dropped.
    pub fn bind(path: &Path, key: &str, keylimit: usize) -> Result<ConnectionPoint> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        let listener = UnixListener::bind(path)?;
        Ok(ConnectionPoint { listener, path: path.to_path_buf(), key: key.as_bytes().to_vec(), keylimit })
    }

    /// Blocks for the next inbound connection and runs the key
    /// challenge inline (this is a deliberately simple poll-one design;
    /// a caller serving many clients runs this in a loop on its own
    /// thread). On success, returns the still-open socket positioned
    /// right after the challenge, ready to receive the segment key.
    pub fn accept_and_verify(&self) -> Result<UnixStream> {
        let (mut stream, _addr) = self.listener.accept()?;

        let mut buf = vec![0u8; self.keylimit];
        let mut filled = 0;
        let mut byte = [0u8; 1];
        while filled < self.keylimit {
            let n = stream.read(&mut byte)?;
            if n == 0 || byte[0] == b'\n' {
                break;
            }
            buf[filled] = byte[0];
            filled += 1;
        }
        buf.truncate(filled);

        if !constant_time_eq(&buf, &self.key) {
            tracing::warn!(target: "shmif.server", "connection point rejected a client");
            return Err(Error::AuthFailed);
        }
        Ok(stream)
    }

    /// Sends the allocated segment key back to an authenticated client.
    pub fn send_segment_key(mut stream: UnixStream, shm_name: &str) -> Result<()> {
        stream.write_all(shm_name.as_bytes())?;
        stream.write_all(b"\n")?;
        Ok(())
    }
}

impl Drop for ConnectionPoint {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;
    use std::io::BufReader;

    #[test]
    fn rejects_wrong_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connpoint.sock");
        let connpoint = ConnectionPoint::bind(&path, "correct-key", 32).unwrap();

        let client = std::thread::spawn({
            let path = path.clone();
            move || {
                let mut stream = UnixStream::connect(&path).unwrap();
                stream.write_all(b"wrong-key\n").unwrap();
            }
        });

        let result = connpoint.accept_and_verify();
        client.join().unwrap();
        assert!(matches!(result, Err(Error::AuthFailed)));
    }

    #[test]
    fn accepts_correct_key_and_returns_segment_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connpoint.sock");
        let connpoint = ConnectionPoint::bind(&path, "correct-key", 32).unwrap();

        let client = std::thread::spawn({
            let path = path.clone();
            move || {
                let stream = UnixStream::connect(&path).unwrap();
                let mut writer = stream.try_clone().unwrap();
                writer.write_all(b"correct-key\n").unwrap();
                let mut reader = BufReader::new(stream);
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                line
            }
        });

        let stream = connpoint.accept_and_verify().unwrap();
        ConnectionPoint::send_segment_key(stream, "segment-42").unwrap();
        let received = client.join().unwrap();
        assert_eq!(received.trim_end(), "segment-42");
    }
}
