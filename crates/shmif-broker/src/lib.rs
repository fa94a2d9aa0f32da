//! The privileged device broker: a separate process that owns whatever
//! access rights the unprivileged renderer should not hold directly
//! (`/dev/dri`, `/dev/input`, TTY/VT control), reached over a narrow,
//! whitelisted request protocol.

pub mod broker;
pub mod channel;
pub mod error;
pub mod protocol;
pub mod signals;
pub mod whitelist;

pub use broker::Broker;
pub use channel::BrokerChannel;
pub use error::{Error, Result};
pub use protocol::Command;
