//! Shared reactor glue (C1). The multi-threaded tokio runtime configured in
//! `main` *is* the reactor; this module only supplies the ordered write
//! queue layered on top of it.

pub mod transport;
pub mod writer;

pub use transport::{ClientTransport, ServerTransport};
pub use writer::{OrderedWriter, WriteQueueError};
