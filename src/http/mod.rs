//! HTTP-facing half of the gateway: the incremental request decoder (C5) and
//! the connection/server loop that owns keep-alive and the WebSocket upgrade
//! handoff (C6).

pub mod parser;
pub mod server;
pub mod types;

pub use parser::HttpCodec;
pub use server::{HttpServer, RouteHandler};
pub use types::{HttpRequest, HttpResponse};
