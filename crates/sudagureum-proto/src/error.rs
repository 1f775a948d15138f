use thiserror::Error;

/// Errors raised while decoding bytes into IRC protocol values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("line exceeds maximum buffer size of {max} bytes")]
    LineTooLong { max: usize },

    #[error("bare CR not followed by LF")]
    BareCarriageReturn,

    #[error("empty prefix after leading ':'")]
    EmptyPrefix,

    #[error("empty command")]
    EmptyCommand,

    #[error("invalid command {0:?}: must be letters or exactly three digits")]
    InvalidCommand(String),

    #[error("message has more than 15 parameters")]
    TooManyParams,

    #[error("parser is latched after a previous error")]
    Latched,
}
