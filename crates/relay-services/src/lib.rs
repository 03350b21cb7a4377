//! relay-services: the shared state and request logic behind the relay:
//! the client registry, request handlers, and file transfer.

pub mod file_transfer;
pub mod handlers;
pub mod registry;

pub use file_transfer::{chunk_file, FileReassembler, ReassemblyOutcome, MAX_CHUNK_SIZE};
pub use handlers::{Action, RequestContext, RequestError, RequestHandler};
pub use registry::{ClientRegistry, Session};
