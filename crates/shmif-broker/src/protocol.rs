//! Fixed-size framed packets exchanged between the unprivileged client
//! and the privileged broker process, matching the command set and
//! `struct packet` layout of the original device broker.

use crate::error::{Error, Result};

/// Matches `MAXPATHLEN` closely enough for device nodes and sysfs paths.
pub const PATH_LIMIT: usize = 256;

/// Wire size of a packet: one command byte, a 4-byte argument, and the
/// fixed path buffer.
pub const PACKET_SIZE: usize = 1 + 4 + PATH_LIMIT;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    OpenDevice { path: String },
    ReleaseDevice { arg: i32, path: String },
    OpenFailed,
    NewInputDevice { path: String },
    DisplayConnectorState { arg: i32 },
    SystemStateRelease,
    SystemStateAcquire,
    SystemStateTerminate,
}

const TAG_OPEN_DEVICE: u8 = b'o';
const TAG_RELEASE_DEVICE: u8 = b'r';
const TAG_OPEN_FAILED: u8 = b'#';
const TAG_NEW_INPUT_DEVICE: u8 = b'i';
const TAG_DISPLAY_CONNECTOR_STATE: u8 = b'd';
const TAG_SYSTEM_STATE_RELEASE: u8 = b'1';
const TAG_SYSTEM_STATE_ACQUIRE: u8 = b'2';
const TAG_SYSTEM_STATE_TERMINATE: u8 = b'3';

fn write_path(buf: &mut [u8; PATH_LIMIT], path: &str) {
    let bytes = path.as_bytes();
    let len = bytes.len().min(PATH_LIMIT - 1);
    buf[..len].copy_from_slice(&bytes[..len]);
    for b in &mut buf[len..] {
        *b = 0;
    }
}

fn read_path(buf: &[u8; PATH_LIMIT]) -> String {
    let len = buf.iter().position(|&b| b == 0).unwrap_or(PATH_LIMIT);
    String::from_utf8_lossy(&buf[..len]).into_owned()
}

impl Command {
    pub fn to_bytes(&self) -> [u8; PACKET_SIZE] {
        let mut out = [0u8; PACKET_SIZE];
        let mut path_buf = [0u8; PATH_LIMIT];
        let (tag, arg) = match self {
            Command::OpenDevice { path } => {
                write_path(&mut path_buf, path);
                (TAG_OPEN_DEVICE, 0)
            }
            Command::ReleaseDevice { arg, path } => {
                write_path(&mut path_buf, path);
                (TAG_RELEASE_DEVICE, *arg)
            }
            Command::OpenFailed => (TAG_OPEN_FAILED, 0),
            Command::NewInputDevice { path } => {
                write_path(&mut path_buf, path);
                (TAG_NEW_INPUT_DEVICE, 0)
            }
            Command::DisplayConnectorState { arg } => (TAG_DISPLAY_CONNECTOR_STATE, *arg),
            Command::SystemStateRelease => (TAG_SYSTEM_STATE_RELEASE, 0),
            Command::SystemStateAcquire => (TAG_SYSTEM_STATE_ACQUIRE, 0),
            Command::SystemStateTerminate => (TAG_SYSTEM_STATE_TERMINATE, 0),
        };
        out[0] = tag;
        out[1..5].copy_from_slice(&arg.to_ne_bytes());
        out[5..].copy_from_slice(&path_buf);
        out
    }

    pub fn from_bytes(buf: &[u8; PACKET_SIZE]) -> Result<Command> {
        let tag = buf[0];
        let arg = i32::from_ne_bytes(buf[1..5].try_into().unwrap());
        let mut path_buf = [0u8; PATH_LIMIT];
        path_buf.copy_from_slice(&buf[5..]);
        let path = || read_path(&path_buf);

        Ok(match tag {
            TAG_OPEN_DEVICE => Command::OpenDevice { path: path() },
            TAG_RELEASE_DEVICE => Command::ReleaseDevice { arg, path: path() },
            TAG_OPEN_FAILED => Command::OpenFailed,
            TAG_NEW_INPUT_DEVICE => Command::NewInputDevice { path: path() },
            TAG_DISPLAY_CONNECTOR_STATE => Command::DisplayConnectorState { arg },
            TAG_SYSTEM_STATE_RELEASE => Command::SystemStateRelease,
            TAG_SYSTEM_STATE_ACQUIRE => Command::SystemStateAcquire,
            TAG_SYSTEM_STATE_TERMINATE => Command::SystemStateTerminate,
            _ => return Err(Error::Malformed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_device_roundtrips_path() {
        let cmd = Command::OpenDevice { path: "/dev/dri/card0".to_string() };
        let bytes = cmd.to_bytes();
        assert_eq!(Command::from_bytes(&bytes).unwrap(), cmd);
    }

    #[test]
    fn release_device_roundtrips_arg_and_path() {
        let cmd = Command::ReleaseDevice { arg: 7, path: "/dev/dri/card0".to_string() };
        let bytes = cmd.to_bytes();
        assert_eq!(Command::from_bytes(&bytes).unwrap(), cmd);
    }

    #[test]
    fn rejects_unknown_tag() {
        let mut bytes = [0u8; PACKET_SIZE];
        bytes[0] = b'?';
        assert!(matches!(Command::from_bytes(&bytes), Err(Error::Malformed)));
    }
}
