//! Wire-level building blocks for the ITv2/TLink panel protocol: byte
//! stuffing, AES-ECB key establishment, the binary codec, the message
//! record catalogue, and the command registry.
//!
//! This crate knows nothing about TCP sockets, sessions, or the panel's
//! object model — see `itv2-engine` for that. It only turns bytes into
//! typed records and back.

pub mod codec;
pub mod command;
pub mod crypto;
pub mod error;
pub mod framing;
pub mod messages;
pub mod packet;
pub mod registry;

pub use command::CommandCode;
pub use error::WireError;
pub use messages::{MessageRecord, TransactionPattern, WireMessage};
pub use packet::MessagePacket;
pub use registry::{RecordMeta, Registry};
