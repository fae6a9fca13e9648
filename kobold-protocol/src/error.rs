//! Protocol error types.

use crate::codec::Format;
use thiserror::Error;

/// Errors raised while framing, parsing or (de)serializing envelopes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A length prefix declared a frame larger than the parser accepts.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// A serialized envelope exceeded the maximum message size.
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("{format} encode error: {reason}")]
    Encode { format: Format, reason: String },

    #[error("{format} decode error: {reason}")]
    Decode { format: Format, reason: String },

    #[error("invalid operation: {0}")]
    InvalidOperation(u8),

    #[error("unknown operation name: {0}")]
    UnknownOperation(String),

    #[error("unknown format: {0}")]
    UnknownFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    pub(crate) fn encode(format: Format, reason: impl ToString) -> Self {
        ProtocolError::Encode {
            format,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn decode(format: Format, reason: impl ToString) -> Self {
        ProtocolError::Decode {
            format,
            reason: reason.to_string(),
        }
    }

    /// Returns whether the error leaves the byte stream unusable.
    ///
    /// Decode and size-limit errors concern a single message; framing and
    /// I/O errors mean the connection has to be dropped.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProtocolError::FrameTooLarge { .. } | ProtocolError::Io(_))
    }
}
