//! # kobold-protocol
//!
//! Wire protocol implementation for kobold.
//!
//! This crate provides:
//! - Length-prefixed framing (4-byte big-endian length + payload)
//! - A stream parser that reassembles frames from arbitrarily chunked reads
//! - The `Message` envelope and its operation tags
//! - Interchangeable envelope codecs (MessagePack, CBOR, JSON, bincode)

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;
pub mod parser;

pub use codec::{Codec, Format};
pub use error::ProtocolError;
pub use frame::{prefix_with_length, strip_prefix, LENGTH_PREFIX_SIZE};
pub use message::{Message, Metadata, Operation};
pub use parser::{ParserStats, StreamParser};

/// Maximum serialized envelope size, before framing (1 MiB).
pub const MAX_MSG_SIZE: usize = 1024 * 1024;

/// Default port for a kobold node.
pub const DEFAULT_PORT: u16 = 7420;
