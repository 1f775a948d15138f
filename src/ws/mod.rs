//! WebSocket-facing half of the gateway: frame codec (C7), connection
//! lifecycle and RPC dispatch (C8).

pub mod connection;
pub mod frame;
pub mod rpc;

pub use connection::WsConnection;
pub use frame::{Frame, Opcode, WsFrameCodec};
pub use rpc::{MethodTable, SudaGureumRequest, SudaGureumResponse};
