//! Client error types.

use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] kobold_protocol::ProtocolError),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("timed out")]
    Timeout,
}

impl ClientError {
    /// Returns whether retrying on a fresh connection may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Io(_) => true,
            ClientError::Timeout => true,
            ClientError::ConnectionClosed => true,
            // A fatal protocol error poisons this connection only; a fresh one may work
            ClientError::Protocol(e) => e.is_fatal(),
            ClientError::NotConnected => false,
        }
    }
}
