use std::io::{Error as IoError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    #[error("Truncated input: {0}")]
    TruncatedInput(String),

    #[error("No prior state for chunk stream {0}")]
    NoPriorState(u32),

    #[error("Payload overrun on chunk stream {chunk_stream_id}: {buffered} buffered + {incoming} incoming exceeds declared length {declared}")]
    OverLength {
        chunk_stream_id: u32,
        buffered: usize,
        incoming: usize,
        declared: usize,
    },

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Encode error: {0}")]
    Encode(String),
}

impl Error {
    /// Create a truncated input error
    pub fn truncated(msg: impl Into<String>) -> Self {
        Error::TruncatedInput(msg.into())
    }

    /// Create a protocol violation error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::ProtocolViolation(msg.into())
    }

    /// Create an encode error
    pub fn encode(msg: impl Into<String>) -> Self {
        Error::Encode(msg.into())
    }

    /// Classify a transport read failure. A source that ends or times out
    /// mid-read means the engine did not get the bytes it was promised.
    pub fn from_read(context: &str, err: IoError) -> Self {
        match err.kind() {
            ErrorKind::UnexpectedEof | ErrorKind::TimedOut | ErrorKind::WouldBlock => {
                Error::TruncatedInput(format!("{}: {}", context, err))
            }
            _ => Error::Io(err),
        }
    }

    /// Whether this error ends the decode session. Truncation can be retried
    /// by the caller once more bytes arrive; desync and corruption cannot.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::NoPriorState(_) | Error::OverLength { .. } | Error::ProtocolViolation(_)
        )
    }
}

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
