//! # kobold-server
//!
//! TCP node for kobold.
//!
//! This crate provides:
//! - Async TCP listener with one worker task per connection
//! - Per-connection stream parsing and envelope decoding
//! - A pluggable message handler
//! - YAML + environment configuration

pub mod config;
pub mod error;
pub mod handler;
pub mod server;
pub mod session;

pub use config::{Config, ConfigError, NetworkConfig, ProtocolConfig};
pub use error::ServerError;
pub use handler::{LoggingHandler, MessageHandler};
pub use server::{Disconnect, Node, NodeStats};
pub use session::Session;
