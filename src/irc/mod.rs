//! IRC-facing half of the gateway: the per-connection client (C3) and the
//! pool that owns the set of live connections (C4).

pub mod client;
pub mod event;
pub mod pool;
pub mod state;

pub use client::IrcClient;
pub use event::IrcEvent;
pub use pool::{ConnectParams, IrcClientPool};
