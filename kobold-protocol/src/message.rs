//! The message envelope carried inside every frame.

use crate::error::ProtocolError;
use bincode::de::{BorrowDecoder, Decoder};
use bincode::enc::Encoder;
use bincode::error::{DecodeError, EncodeError};
use bincode::{BorrowDecode, Decode, Encode};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Operation tags.
///
/// The discriminants are part of the wire contract: every format encodes the
/// operation as this `u8`, and an unknown value is a decode error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Operation {
    Unsupported = 0,
    // Service topics
    Advertise = 1,
    Publish = 2,
    Reply = 3,
    Request = 4,
    // Subscriptions
    Subscribe = 5,
    Unadvertise = 6,
    Unsubscribe = 7,
}

impl Operation {
    /// All operations in discriminant order.
    pub const ALL: [Operation; 8] = [
        Operation::Unsupported,
        Operation::Advertise,
        Operation::Publish,
        Operation::Reply,
        Operation::Request,
        Operation::Subscribe,
        Operation::Unadvertise,
        Operation::Unsubscribe,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Operation::Unsupported => "unsupported",
            Operation::Advertise => "advertise",
            Operation::Publish => "publish",
            Operation::Reply => "reply",
            Operation::Request => "request",
            Operation::Subscribe => "subscribe",
            Operation::Unadvertise => "unadvertise",
            Operation::Unsubscribe => "unsubscribe",
        }
    }
}

impl TryFrom<u8> for Operation {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Operation::ALL
            .get(value as usize)
            .copied()
            .ok_or(ProtocolError::InvalidOperation(value))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Operation::ALL
            .into_iter()
            .find(|op| op.name() == lower)
            .ok_or_else(|| ProtocolError::UnknownOperation(s.to_string()))
    }
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for Operation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        Operation::try_from(value).map_err(serde::de::Error::custom)
    }
}

impl Encode for Operation {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        self.as_u8().encode(encoder)
    }
}

impl<Context> Decode<Context> for Operation {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
        let value = u8::decode(decoder)?;
        Operation::try_from(value)
            .map_err(|_| DecodeError::OtherString(format!("invalid operation: {value}")))
    }
}

impl<'de, Context> BorrowDecode<'de, Context> for Operation {
    fn borrow_decode<D: BorrowDecoder<'de, Context = Context>>(
        decoder: &mut D,
    ) -> Result<Self, DecodeError> {
        Decode::decode(decoder)
    }
}

/// Identifies the client and connection a message originated from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Metadata {
    pub client_id: String,

    #[serde(rename = "conn_id")]
    pub connection_id: String,

    /// Auth token, if the client presented one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Metadata {
    pub fn new(client_id: impl Into<String>, connection_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            connection_id: connection_id.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Message envelope.
///
/// Optional fields are omitted from self-describing encodings when absent, so
/// `None` and `Some("")` stay distinct through every codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Message {
    /// Client-scoped unique identifier.
    pub id: String,

    #[serde(rename = "op")]
    pub operation: Operation,

    pub topic: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    /// Correlates a request with its reply.
    #[serde(rename = "tx_id", default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "content_bytes"
    )]
    pub content: Option<Vec<u8>>,
}

impl Message {
    pub fn new(id: impl Into<String>, operation: Operation, topic: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            operation,
            topic: topic.into(),
            metadata: None,
            transaction_id: None,
            content: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_transaction_id(mut self, tx_id: impl Into<String>) -> Self {
        self.transaction_id = Some(tx_id.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Returns the content length, zero when absent.
    pub fn content_len(&self) -> usize {
        self.content.as_ref().map_or(0, Vec::len)
    }
}

/// Serializes content as a native byte string where the format has one
/// (MessagePack `bin`, CBOR byte string) and as standard base64 text in
/// human-readable formats. Textual decoding also accepts an array of bytes.
mod content_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::de::{self, SeqAccess, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) if serializer.is_human_readable() => {
                serializer.serialize_str(&STANDARD.encode(bytes))
            }
            Some(bytes) => serializer.serialize_bytes(bytes),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        deserializer.deserialize_option(OptionalBytes)
    }

    struct OptionalBytes;

    impl<'de> Visitor<'de> for OptionalBytes {
        type Value = Option<Vec<u8>>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("optional byte string")
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
            // Textual formats hand strings to `deserialize_bytes` as raw UTF-8
            if deserializer.is_human_readable() {
                deserializer.deserialize_any(ByteBuf).map(Some)
            } else {
                deserializer.deserialize_byte_buf(ByteBuf).map(Some)
            }
        }
    }

    struct ByteBuf;

    impl<'de> Visitor<'de> for ByteBuf {
        type Value = Vec<u8>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("byte string, base64 string or array of bytes")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            STANDARD
                .decode(v)
                .map_err(|e| E::custom(format_args!("invalid base64 content: {}", e)))
        }

        fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
            Ok(v.to_vec())
        }

        fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
            Ok(v)
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(4096));
            while let Some(byte) = seq.next_element::<u8>()? {
                bytes.push(byte);
            }
            Ok(bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_discriminants() {
        let expected = [
            (Operation::Unsupported, 0),
            (Operation::Advertise, 1),
            (Operation::Publish, 2),
            (Operation::Reply, 3),
            (Operation::Request, 4),
            (Operation::Subscribe, 5),
            (Operation::Unadvertise, 6),
            (Operation::Unsubscribe, 7),
        ];
        for (op, value) in expected {
            assert_eq!(op.as_u8(), value);
            assert_eq!(Operation::try_from(value).unwrap(), op);
        }
    }

    #[test]
    fn test_operation_out_of_range() {
        assert!(matches!(
            Operation::try_from(8),
            Err(ProtocolError::InvalidOperation(8))
        ));
        assert!(Operation::try_from(255).is_err());
    }

    #[test]
    fn test_operation_from_str() {
        assert_eq!("publish".parse::<Operation>().unwrap(), Operation::Publish);
        assert_eq!("REPLY".parse::<Operation>().unwrap(), Operation::Reply);
        assert!("broadcast".parse::<Operation>().is_err());

        for op in Operation::ALL {
            assert_eq!(op.to_string().parse::<Operation>().unwrap(), op);
        }
    }

    #[test]
    fn test_operation_json_is_numeric() {
        assert_eq!(serde_json::to_string(&Operation::Subscribe).unwrap(), "5");
        let op: Operation = serde_json::from_str("3").unwrap();
        assert_eq!(op, Operation::Reply);
        assert!(serde_json::from_str::<Operation>("8").is_err());
    }

    #[test]
    fn test_message_builder() {
        let msg = Message::new("1", Operation::Request, "/svc/echo")
            .with_metadata(Metadata::new("client-a", "conn-1").with_token("secret"))
            .with_transaction_id("tx-1")
            .with_content("ping");

        assert_eq!(msg.id, "1");
        assert_eq!(msg.operation, Operation::Request);
        assert_eq!(msg.topic, "/svc/echo");
        assert_eq!(msg.metadata.as_ref().unwrap().token.as_deref(), Some("secret"));
        assert_eq!(msg.transaction_id.as_deref(), Some("tx-1"));
        assert_eq!(msg.content_len(), 4);
    }

    #[test]
    fn test_json_field_names() {
        let msg = Message::new("7", Operation::Publish, "/hello/world")
            .with_metadata(Metadata::new("c", "k"))
            .with_transaction_id("t")
            .with_content(vec![1u8, 2]);
        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["id"], "7");
        assert_eq!(value["op"], 2);
        assert_eq!(value["topic"], "/hello/world");
        assert_eq!(value["metadata"]["client_id"], "c");
        assert_eq!(value["metadata"]["conn_id"], "k");
        assert!(value["metadata"].get("token").is_none());
        assert_eq!(value["tx_id"], "t");
        assert_eq!(value["content"], "AQI=");
    }

    #[test]
    fn test_json_content_is_base64() {
        let msg = Message::new("1", Operation::Publish, "t").with_content(b"hi".to_vec());
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"id":"1","op":2,"topic":"t","content":"aGk="}"#);
        assert_eq!(serde_json::from_str::<Message>(&json).unwrap(), msg);

        // Empty content stays present
        let empty = Message::new("1", Operation::Publish, "t").with_content(Vec::new());
        let json = serde_json::to_string(&empty).unwrap();
        assert!(json.ends_with(r#""content":""}"#));
        assert_eq!(serde_json::from_str::<Message>(&json).unwrap(), empty);
    }

    #[test]
    fn test_json_content_accepts_byte_array() {
        let msg: Message =
            serde_json::from_str(r#"{"id":"1","op":2,"topic":"t","content":[104,105]}"#).unwrap();
        assert_eq!(msg.content.as_deref(), Some(&b"hi"[..]));

        let bad = r#"{"id":"1","op":2,"topic":"t","content":"not base64!"}"#;
        assert!(serde_json::from_str::<Message>(bad).is_err());
    }

    #[test]
    fn test_json_absent_fields_omitted() {
        let msg = Message::new("1", Operation::Publish, "t");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"id":"1","op":2,"topic":"t"}"#);
    }

    #[test]
    fn test_json_null_reads_as_absent() {
        let msg: Message = serde_json::from_str(
            r#"{"id":"1","op":2,"topic":"t","metadata":null,"tx_id":null,"content":null}"#,
        )
        .unwrap();
        assert_eq!(msg, Message::new("1", Operation::Publish, "t"));
    }
}
