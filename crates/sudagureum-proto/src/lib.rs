//! IRC protocol primitives shared by the gateway: incremental line framing,
//! message grammar, ISUPPORT accounting, and channel mode-string walking.
//!
//! Connection-shaped state (clients, channels, participants) lives in the
//! `sudagureum` binary crate; this crate only knows about bytes and grammar.

pub mod casemap;
pub mod error;
pub mod isupport;
pub mod line;
pub mod message;
pub mod mode;

pub use error::ProtocolError;
pub use isupport::ServerOptions;
pub use line::LineCodec;
pub use message::{IrcMessage, MAX_PARAMS};
pub use mode::{ModeChange, walk_channel_modes};
