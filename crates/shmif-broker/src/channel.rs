//! Framed packet transport over the broker's control socket.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;

use crate::error::Result;
use crate::protocol::{Command, PACKET_SIZE};

pub struct BrokerChannel {
    stream: UnixStream,
}

impl BrokerChannel {
    pub fn new(stream: UnixStream) -> BrokerChannel {
        BrokerChannel { stream }
    }

    pub fn send(&mut self, command: &Command) -> Result<()> {
        self.stream.write_all(&command.to_bytes())?;
        Ok(())
    }

    pub fn recv(&mut self) -> Result<Command> {
        let mut buf = [0u8; PACKET_SIZE];
        self.stream.read_exact(&mut buf)?;
        Command::from_bytes(&buf)
    }

    pub fn try_clone(&self) -> Result<BrokerChannel> {
        Ok(BrokerChannel { stream: self.stream.try_clone()? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_command_over_a_socketpair() {
        let (a, b) = UnixStream::pair().unwrap();
        let mut sender = BrokerChannel::new(a);
        let mut receiver = BrokerChannel::new(b);

        sender.send(&Command::OpenDevice { path: "/dev/input/event3".into() }).unwrap();
        assert_eq!(receiver.recv().unwrap(), Command::OpenDevice { path: "/dev/input/event3".into() });
    }
}
