//! Error taxonomy for the gateway binary. Leaf errors are typed with
//! `thiserror`; `main` collapses everything into `anyhow::Result`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid request line")]
    InvalidRequestLine,
    #[error("request target must be origin-form (start with '/')")]
    NonOriginTarget,
    #[error("malformed header line")]
    MalformedHeader,
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WsError {
    #[error("control frame must be final")]
    FragmentedControlFrame,
    #[error("control frame payload exceeds 125 bytes")]
    ControlFramePayloadTooLarge,
    #[error("continuation frame received with no fragmented message in progress")]
    UnexpectedContinuation,
    #[error("unknown frame opcode {0:#x}")]
    UnknownOpcode(u8),
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}
