//! Server error types.

use crate::config::ConfigError;
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] kobold_protocol::ProtocolError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("server shutting down")]
    ShuttingDown,
}

