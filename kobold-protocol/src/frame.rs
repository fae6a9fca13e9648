//! Length-prefixed frame format.
//!
//! ```text
//! +-----------------+---------------------+
//! | length (u32 BE) | payload             |
//! | 4 bytes         | length bytes        |
//! +-----------------+---------------------+
//! ```
//!
//! There is no magic number, version byte or checksum. The payload is a
//! serialized envelope in whichever format both peers agreed on.

use crate::error::ProtocolError;
use crate::MAX_MSG_SIZE;
use bytes::{BufMut, BytesMut};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Prepends the 4-byte big-endian length to `payload`.
///
/// Payloads larger than [`MAX_MSG_SIZE`] are rejected rather than truncated.
pub fn prefix_with_length(payload: &[u8]) -> Result<BytesMut, ProtocolError> {
    if payload.len() > MAX_MSG_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: payload.len(),
            max: MAX_MSG_SIZE,
        });
    }

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    Ok(buf)
}

/// Reads the declared payload length from the front of `buf`, if at least
/// four bytes are present. Nothing is consumed.
pub fn peek_length(buf: &[u8]) -> Option<usize> {
    let prefix: [u8; LENGTH_PREFIX_SIZE] = buf.get(..LENGTH_PREFIX_SIZE)?.try_into().ok()?;
    Some(u32::from_be_bytes(prefix) as usize)
}

/// Returns the payload of a single complete frame.
///
/// `None` when `frame` is shorter than its prefix or carries trailing bytes.
pub fn strip_prefix(frame: &[u8]) -> Option<&[u8]> {
    let len = peek_length(frame)?;
    let payload = &frame[LENGTH_PREFIX_SIZE..];
    (payload.len() == len).then_some(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_layout() {
        let framed = prefix_with_length(b"hello").unwrap();
        assert_eq!(&framed[..], &[0x00, 0x00, 0x00, 0x05, b'h', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn test_empty_payload() {
        let framed = prefix_with_length(b"").unwrap();
        assert_eq!(&framed[..], &[0, 0, 0, 0]);
        assert_eq!(strip_prefix(&framed), Some(&b""[..]));
    }

    #[test]
    fn test_size_limit_boundary() {
        let at_limit = vec![0u8; MAX_MSG_SIZE];
        let framed = prefix_with_length(&at_limit).unwrap();
        assert_eq!(framed.len(), MAX_MSG_SIZE + LENGTH_PREFIX_SIZE);
        assert_eq!(peek_length(&framed), Some(MAX_MSG_SIZE));

        let over_limit = vec![0u8; MAX_MSG_SIZE + 1];
        let result = prefix_with_length(&over_limit);
        assert!(matches!(
            result,
            Err(ProtocolError::MessageTooLarge { size, max })
                if size == MAX_MSG_SIZE + 1 && max == MAX_MSG_SIZE
        ));
    }

    #[test]
    fn test_peek_length_needs_four_bytes() {
        assert_eq!(peek_length(&[0, 0, 1]), None);
        assert_eq!(peek_length(&[0, 0, 1, 0]), Some(256));
        assert_eq!(peek_length(&[0xFF, 0xFF, 0xFF, 0xFF, 1]), Some(u32::MAX as usize));
    }

    #[test]
    fn test_strip_prefix_rejects_mismatched_length() {
        assert_eq!(strip_prefix(&[0, 0, 0, 3, b'a', b'b']), None);
        assert_eq!(strip_prefix(&[0, 0, 0, 1, b'a', b'b']), None);
        assert_eq!(strip_prefix(&[0, 0]), None);
        assert_eq!(strip_prefix(&[0, 0, 0, 2, b'a', b'b']), Some(&b"ab"[..]));
    }
}
