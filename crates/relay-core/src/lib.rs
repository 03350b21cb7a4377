//! relay-core: wire format, connection I/O, payload schemas, and config.
//! All other relay crates depend on this one.

pub mod config;
pub mod io;
pub mod message;
pub mod sanitize;
pub mod wire;

pub use message::ClientId;
pub use wire::{MessageType, Packet, WireError};
