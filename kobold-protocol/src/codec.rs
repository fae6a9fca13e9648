//! Envelope codecs.
//!
//! A [`Format`] is agreed out of band by both ends of a connection; nothing
//! on the wire says which one produced a payload, so bytes from one format
//! must never be handed to another format's decoder.

use crate::error::ProtocolError;
use crate::frame::prefix_with_length;
use crate::message::Message;
use crate::MAX_MSG_SIZE;
use bincode::config::{BigEndian, Configuration, Fixint, Limit};
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

type BincodeConfig = Configuration<BigEndian, Fixint, Limit<MAX_MSG_SIZE>>;

fn bincode_config() -> BincodeConfig {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
        .with_limit::<MAX_MSG_SIZE>()
}

/// Envelope encodings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// MessagePack with named keys (compact binary).
    MsgPack,
    /// CBOR with named keys (compact binary).
    #[default]
    Cbor,
    /// JSON (textual).
    Json,
    /// bincode, positional in field order (schema binary).
    Bincode,
}

impl Format {
    pub const ALL: [Format; 4] = [Format::MsgPack, Format::Cbor, Format::Json, Format::Bincode];

    pub fn name(self) -> &'static str {
        match self {
            Format::MsgPack => "msgpack",
            Format::Cbor => "cbor",
            Format::Json => "json",
            Format::Bincode => "bincode",
        }
    }

    /// Returns whether the format is human readable.
    pub fn is_textual(self) -> bool {
        matches!(self, Format::Json)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "msgpack" | "messagepack" | "compact" => Ok(Format::MsgPack),
            "cbor" => Ok(Format::Cbor),
            "json" | "text" => Ok(Format::Json),
            "bincode" | "schema" => Ok(Format::Bincode),
            _ => Err(ProtocolError::UnknownFormat(s.to_string())),
        }
    }
}

/// Serializes and deserializes envelopes in one format.
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    format: Format,
    max_message_size: usize,
}

impl Codec {
    pub fn new(format: Format) -> Self {
        Self {
            format,
            max_message_size: MAX_MSG_SIZE,
        }
    }

    /// Lowers the size limit. Values above [`MAX_MSG_SIZE`] are capped.
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max.min(MAX_MSG_SIZE);
        self
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Encodes the envelope body without a length prefix.
    pub fn encode_body(&self, msg: &Message) -> Result<Bytes, ProtocolError> {
        let format = self.format;
        let body = match format {
            Format::MsgPack => {
                rmp_serde::to_vec_named(msg).map_err(|e| ProtocolError::encode(format, e))?
            }
            Format::Cbor => {
                let mut buf = Vec::with_capacity(64 + msg.content_len());
                ciborium::into_writer(msg, &mut buf)
                    .map_err(|e| ProtocolError::encode(format, e))?;
                buf
            }
            Format::Json => {
                serde_json::to_vec(msg).map_err(|e| ProtocolError::encode(format, e))?
            }
            Format::Bincode => bincode::encode_to_vec(msg, bincode_config())
                .map_err(|e| ProtocolError::encode(format, e))?,
        };

        if body.len() > self.max_message_size {
            return Err(ProtocolError::MessageTooLarge {
                size: body.len(),
                max: self.max_message_size,
            });
        }
        Ok(Bytes::from(body))
    }

    /// Encodes the envelope and prepends the length prefix.
    pub fn serialize(&self, msg: &Message) -> Result<BytesMut, ProtocolError> {
        let body = self.encode_body(msg)?;
        prefix_with_length(&body)
    }

    /// Decodes a payload whose length prefix was already stripped, e.g. one
    /// produced by [`StreamParser::feed`](crate::StreamParser::feed).
    pub fn deserialize(&self, payload: &[u8]) -> Result<Message, ProtocolError> {
        let format = self.format;
        match format {
            Format::MsgPack => {
                let mut rest = payload;
                let msg = Message::deserialize(&mut rmp_serde::Deserializer::new(&mut rest))
                    .map_err(|e| ProtocolError::decode(format, e))?;
                reject_trailing(format, rest.len())?;
                Ok(msg)
            }
            Format::Cbor => {
                let mut rest = payload;
                let msg: Message = ciborium::from_reader(&mut rest)
                    .map_err(|e| ProtocolError::decode(format, e))?;
                reject_trailing(format, rest.len())?;
                Ok(msg)
            }
            Format::Json => {
                serde_json::from_slice(payload).map_err(|e| ProtocolError::decode(format, e))
            }
            Format::Bincode => {
                let (msg, read): (Message, usize) =
                    bincode::decode_from_slice(payload, bincode_config())
                        .map_err(|e| ProtocolError::decode(format, e))?;
                reject_trailing(format, payload.len() - read)?;
                Ok(msg)
            }
        }
    }
}

/// Bytes left over after one complete value mean the payload is malformed.
fn reject_trailing(format: Format, remaining: usize) -> Result<(), ProtocolError> {
    if remaining > 0 {
        return Err(ProtocolError::decode(
            format,
            format!("{} trailing bytes", remaining),
        ));
    }
    Ok(())
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(Format::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::strip_prefix;
    use crate::message::{Metadata, Operation};
    use crate::parser::StreamParser;
    use proptest::prelude::*;

    fn full_message() -> Message {
        Message::new("42", Operation::Request, "/svc/time")
            .with_metadata(Metadata::new("client-1", "conn-9").with_token("tok"))
            .with_transaction_id("tx-42")
            .with_content(vec![0u8, 1, 2, 255])
    }

    fn roundtrip(format: Format, msg: &Message) -> Message {
        let codec = Codec::new(format);
        let framed = codec.serialize(msg).unwrap();
        let payload = strip_prefix(&framed).unwrap();
        codec.deserialize(payload).unwrap()
    }

    #[test]
    fn test_publish_roundtrip_all_formats() {
        let msg = Message::new("1", Operation::Publish, "/hello/world").with_content("hi");
        for format in Format::ALL {
            let decoded = roundtrip(format, &msg);
            assert_eq!(decoded, msg, "format {format}");
            assert_eq!(decoded.operation, Operation::Publish);
            assert_eq!(decoded.topic, "/hello/world");
            assert_eq!(decoded.content.as_deref(), Some(&b"hi"[..]));
            assert!(decoded.metadata.is_none());
            assert!(decoded.transaction_id.is_none());
        }
    }

    #[test]
    fn test_full_roundtrip_all_formats() {
        let msg = full_message();
        for format in Format::ALL {
            assert_eq!(roundtrip(format, &msg), msg, "format {format}");
        }
    }

    #[test]
    fn test_absent_distinct_from_empty() {
        let empty = Message::new("", Operation::Reply, "")
            .with_metadata(Metadata::new("", "").with_token(""))
            .with_transaction_id("")
            .with_content(Vec::new());
        let absent = Message::new("", Operation::Reply, "");

        for format in Format::ALL {
            assert_eq!(roundtrip(format, &empty), empty, "format {format}");
            assert_eq!(roundtrip(format, &absent), absent, "format {format}");
        }
    }

    #[test]
    fn test_every_operation_survives_every_format() {
        for format in Format::ALL {
            for op in Operation::ALL {
                let msg = Message::new("id", op, "t");
                assert_eq!(roundtrip(format, &msg).operation, op);
            }
        }
    }

    #[test]
    fn test_out_of_range_operation_rejected() {
        let bad = Message::new("1", Operation::Unsubscribe, "t");

        for format in Format::ALL {
            let codec = Codec::new(format);
            let mut body = codec.encode_body(&bad).unwrap().to_vec();

            // Unsubscribe (7) is encoded as a single byte in every format;
            // bump it to 8.
            let pos = match format {
                Format::Json => {
                    let text = std::str::from_utf8(&body).unwrap();
                    text.find("\"op\":7").unwrap() + 5
                }
                Format::Bincode => {
                    // u64 length + 1 byte id, then the op byte
                    8 + 1
                }
                Format::MsgPack | Format::Cbor => {
                    let key = body.windows(2).position(|w| w == b"op").unwrap();
                    key + 2
                }
            };
            assert_eq!(body[pos], if format == Format::Json { b'7' } else { 7 });
            body[pos] = if format == Format::Json { b'8' } else { 8 };

            let result = codec.deserialize(&body);
            assert!(
                matches!(result, Err(ProtocolError::Decode { .. })),
                "format {format} accepted op 8"
            );
        }
    }

    #[test]
    fn test_malformed_payload_is_decode_error() {
        for format in Format::ALL {
            let codec = Codec::new(format);
            let result = codec.deserialize(&[0xFF, 0xFF, 0xFF]);
            assert!(
                matches!(result, Err(ProtocolError::Decode { format: f, .. }) if f == format),
                "format {format}"
            );
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        for format in Format::ALL {
            let codec = Codec::new(format);
            let mut body = codec.encode_body(&full_message()).unwrap().to_vec();
            assert!(codec.deserialize(&body).is_ok());

            body.extend_from_slice(&[0xDE, 0xAD]);
            let err = codec.deserialize(&body).unwrap_err();
            assert!(
                matches!(err, ProtocolError::Decode { format: f, .. } if f == format),
                "{}: {:?}",
                format,
                err
            );
        }
    }

    #[test]
    fn test_formats_are_not_interchangeable() {
        let msg = full_message();
        let body = Codec::new(Format::MsgPack).encode_body(&msg).unwrap();
        assert!(Codec::new(Format::Json).deserialize(&body).is_err());
        assert!(Codec::new(Format::Bincode).deserialize(&body).is_err());
    }

    /// Finds the content length that makes the body exactly `target` bytes.
    ///
    /// Binary formats use a fixed-size length header for byte strings of
    /// 64 KiB and up, so the overhead is constant in that range.
    fn content_len_for(codec: &Codec, target: usize) -> usize {
        let probe = 100_000;
        let msg = Message::new("1", Operation::Publish, "/big").with_content(vec![7u8; probe]);
        let overhead = codec.encode_body(&msg).unwrap().len() - probe;
        target - overhead
    }

    #[test]
    fn test_size_limit_boundary() {
        for format in [Format::MsgPack, Format::Cbor, Format::Bincode] {
            let codec = Codec::new(format);
            let len = content_len_for(&codec, MAX_MSG_SIZE);

            let at_limit = Message::new("1", Operation::Publish, "/big").with_content(vec![7u8; len]);
            let body = codec.encode_body(&at_limit).unwrap();
            assert_eq!(body.len(), MAX_MSG_SIZE, "format {format}");
            let framed = codec.serialize(&at_limit).unwrap();
            assert_eq!(framed.len(), MAX_MSG_SIZE + 4);

            let over = Message::new("1", Operation::Publish, "/big").with_content(vec![7u8; len + 1]);
            let result = codec.serialize(&over);
            assert!(
                matches!(result, Err(ProtocolError::MessageTooLarge { size, .. }) if size == MAX_MSG_SIZE + 1),
                "format {format}"
            );
        }
    }

    #[test]
    fn test_lowered_limit() {
        let codec = Codec::new(Format::Json).with_max_message_size(16);
        let msg = Message::new("1", Operation::Publish, "/a/rather/long/topic");
        assert!(matches!(
            codec.serialize(&msg),
            Err(ProtocolError::MessageTooLarge { max: 16, .. })
        ));

        let codec = Codec::new(Format::Json).with_max_message_size(usize::MAX);
        assert_eq!(codec.max_message_size(), MAX_MSG_SIZE);
    }

    #[test]
    fn test_parser_feeds_codec() {
        let codec = Codec::new(Format::Cbor);
        let messages: Vec<Message> = (0..5)
            .map(|i| Message::new(i.to_string(), Operation::Reply, "/hello/world").with_transaction_id(format!("tx-{i}")))
            .collect();

        let mut stream = Vec::new();
        for msg in &messages {
            stream.extend_from_slice(&codec.serialize(msg).unwrap());
        }

        let mut parser = StreamParser::new();
        let mut decoded = Vec::new();
        for chunk in stream.chunks(7) {
            for payload in parser.feed(chunk).unwrap() {
                decoded.push(codec.deserialize(&payload).unwrap());
            }
        }
        assert_eq!(decoded, messages);
    }

    #[test]
    fn test_format_parse_and_display() {
        assert_eq!("msgpack".parse::<Format>().unwrap(), Format::MsgPack);
        assert_eq!("compact".parse::<Format>().unwrap(), Format::MsgPack);
        assert_eq!("schema".parse::<Format>().unwrap(), Format::Bincode);
        assert_eq!("TEXT".parse::<Format>().unwrap(), Format::Json);
        assert!(matches!(
            "capnp".parse::<Format>(),
            Err(ProtocolError::UnknownFormat(_))
        ));

        for format in Format::ALL {
            assert_eq!(format.to_string().parse::<Format>().unwrap(), format);
        }
        assert_eq!(Format::default(), Format::Cbor);
        assert!(Format::Json.is_textual());
    }

    fn arb_operation() -> impl Strategy<Value = Operation> {
        (0u8..8).prop_map(|v| Operation::try_from(v).unwrap())
    }

    fn arb_message() -> impl Strategy<Value = Message> {
        (
            ".{0,16}",
            arb_operation(),
            "[a-z/]{0,24}",
            prop::option::of((".{0,8}", ".{0,8}", prop::option::of(".{0,8}"))),
            prop::option::of(".{0,12}"),
            prop::option::of(prop::collection::vec(any::<u8>(), 0..128)),
        )
            .prop_map(|(id, op, topic, metadata, tx_id, content)| Message {
                id,
                operation: op,
                topic,
                metadata: metadata.map(|(client_id, connection_id, token)| Metadata {
                    client_id,
                    connection_id,
                    token,
                }),
                transaction_id: tx_id,
                content,
            })
    }

    proptest! {
        #[test]
        fn prop_roundtrip(msg in arb_message()) {
            for format in Format::ALL {
                prop_assert_eq!(roundtrip(format, &msg), msg.clone());
            }
        }
    }
}
