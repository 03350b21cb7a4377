//! relay-cli: interactive relay client.
//!
//! The network side runs as a [`Pipeline`]: a receiver task feeding a
//! presenter task. The binary's main task reads commands and writes requests.

pub mod commands;
pub mod pipeline;
pub mod present;

pub use commands::{Command, CommandError};
pub use pipeline::Pipeline;
pub use present::{PresentationError, Presenter};
