//! Stream reassembly of length-prefixed frames.
//!
//! A [`StreamParser`] belongs to exactly one byte stream. Chunks are appended
//! to an accumulator as they are read off the socket and every complete frame
//! is split off the front, so consumed bytes are never retained.

use crate::error::ProtocolError;
use crate::frame::{peek_length, LENGTH_PREFIX_SIZE};
use crate::MAX_MSG_SIZE;
use bytes::{Buf, Bytes, BytesMut};

/// Initial accumulator capacity.
const INITIAL_CAPACITY: usize = 8192;

/// Per-parser diagnostic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserStats {
    /// Non-empty chunks fed.
    pub feeds: u64,
    /// Complete frames produced.
    pub frames: u64,
    /// Bytes received, prefixes included.
    pub bytes: u64,
}

/// Reassembles frames from an arbitrarily chunked byte stream.
#[derive(Debug)]
pub struct StreamParser {
    buffer: BytesMut,
    max_frame_size: usize,
    stats: ParserStats,
    /// Declared length of the prefix that stopped the parser.
    rejected_len: Option<usize>,
}

impl StreamParser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
            max_frame_size: MAX_MSG_SIZE,
            stats: ParserStats::default(),
            rejected_len: None,
        }
    }

    /// Sets the largest payload length a prefix may declare.
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    /// Appends `chunk` and returns every payload that is now complete, in
    /// the order it was sent.
    ///
    /// Once a prefix declares more than the configured maximum the stream
    /// cannot be resynchronized. Frames completed ahead of that prefix in the
    /// same chunk are still returned; the parser then stays rejected and
    /// every later call fails with [`ProtocolError::FrameTooLarge`]. Callers
    /// check [`StreamParser::rejected`] after handling the returned payloads.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>, ProtocolError> {
        if let Some(err) = self.rejected() {
            return Err(err);
        }
        if chunk.is_empty() {
            return Ok(Vec::new());
        }

        self.stats.feeds += 1;
        self.stats.bytes += chunk.len() as u64;
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        loop {
            match self.next_frame() {
                Ok(Some(payload)) => payloads.push(payload),
                Ok(None) => break,
                Err(err) => {
                    if let ProtocolError::FrameTooLarge { size, .. } = &err {
                        self.rejected_len = Some(*size);
                    }
                    if payloads.is_empty() {
                        return Err(err);
                    }
                    break;
                }
            }
        }
        Ok(payloads)
    }

    /// Returns the size error that stopped this parser, if any.
    pub fn rejected(&self) -> Option<ProtocolError> {
        self.rejected_len.map(|size| ProtocolError::FrameTooLarge {
            size,
            max: self.max_frame_size,
        })
    }

    /// Splits the next complete payload off the accumulator.
    ///
    /// Returns `Ok(None)` while the prefix or the payload is still partial;
    /// the prefix is left in place so it is re-read on the next call.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        let len = match peek_length(&self.buffer) {
            Some(len) => len,
            None => return Ok(None),
        };

        if len > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: len,
                max: self.max_frame_size,
            });
        }

        if self.buffer.len() < LENGTH_PREFIX_SIZE + len {
            return Ok(None);
        }

        self.buffer.advance(LENGTH_PREFIX_SIZE);
        let payload = self.buffer.split_to(len).freeze();
        self.stats.frames += 1;
        Ok(Some(payload))
    }

    /// Returns the number of bytes held for a partial frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the maximum accepted payload length.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    /// Drops any partial frame and resets a rejected parser.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.rejected_len = None;
    }
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}
