//! # kobold-client
//!
//! Client library for kobold nodes.
//!
//! This crate provides:
//! - Async TCP connection with length-prefixed framing
//! - Batched sends and framed receive
//! - A high-level client that assigns ids and metadata

pub mod client;
pub mod connection;
pub mod error;

pub use client::Client;
pub use connection::{Connection, ConnectionConfig};
pub use error::ClientError;
