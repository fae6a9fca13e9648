//! Connection management.

use crate::error::ClientError;
use bytes::{Bytes, BytesMut};
use kobold_protocol::{Codec, Format, Message, StreamParser};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Default read buffer size (1 MiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (16 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Node address.
    pub addr: SocketAddr,
    /// Envelope format; must match the node's.
    pub format: Format,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// How long `recv` waits for a complete message.
    pub read_timeout: Duration,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
}

impl ConnectionConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            format: Format::default(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }
}

/// A framed connection to a kobold node.
///
/// Owns its stream parser; a connection is driven by one task at a time.
pub struct Connection {
    config: ConnectionConfig,
    codec: Codec,
    stream: Option<TcpStream>,
    parser: StreamParser,
    /// Payloads parsed but not yet returned by `recv`.
    ready: VecDeque<Bytes>,
    read_buf: Vec<u8>,
    bytes_sent: u64,
    messages_sent: u64,
}

impl Connection {
    /// Creates a new connection (not yet connected).
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            codec: Codec::new(config.format),
            stream: None,
            parser: StreamParser::new(),
            ready: VecDeque::new(),
            read_buf: Vec::new(),
            bytes_sent: 0,
            messages_sent: 0,
            config,
        }
    }

    /// Connects to the node.
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        tracing::debug!("Connecting to {}...", self.config.addr);

        let tcp_stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(self.config.addr),
        )
        .await
        .map_err(|_| {
            tracing::debug!("Connection timeout");
            ClientError::Timeout
        })?
        .map_err(|e| {
            tracing::debug!("Connection failed: {}", e);
            ClientError::Io(e)
        })?;

        tcp_stream.set_nodelay(true).ok();

        self.stream = Some(tcp_stream);
        self.parser.clear();
        self.ready.clear();
        self.read_buf = vec![0u8; self.config.read_buffer_size];

        tracing::debug!("Connected to {} (format={})", self.config.addr, self.codec.format());
        Ok(())
    }

    /// Serializes and writes one message.
    ///
    /// Oversized messages fail before anything is written.
    pub async fn send(&mut self, message: &Message) -> Result<(), ClientError> {
        let frame = self.codec.serialize(message)?;
        self.write_frames(&frame, 1).await
    }

    /// Serializes every message into one buffer and writes it at once.
    pub async fn send_batch(&mut self, messages: &[Message]) -> Result<(), ClientError> {
        let mut buf = BytesMut::new();
        for message in messages {
            buf.extend_from_slice(&self.codec.serialize(message)?);
        }
        self.write_frames(&buf, messages.len() as u64).await
    }

    async fn write_frames(&mut self, data: &[u8], count: u64) -> Result<(), ClientError> {
        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;
        // write_all either drains the whole buffer or fails
        stream.write_all(data).await?;
        self.bytes_sent += data.len() as u64;
        self.messages_sent += count;
        tracing::debug!("Sent {} message(s), {} bytes", count, data.len());
        Ok(())
    }

    /// Waits for the next complete message.
    pub async fn recv(&mut self) -> Result<Message, ClientError> {
        let timeout = self.config.read_timeout;
        let payload = tokio::time::timeout(timeout, self.next_payload())
            .await
            .map_err(|_| ClientError::Timeout)??;
        Ok(self.codec.deserialize(&payload)?)
    }

    async fn next_payload(&mut self) -> Result<Bytes, ClientError> {
        loop {
            if let Some(payload) = self.ready.pop_front() {
                return Ok(payload);
            }
            if let Some(e) = self.parser.rejected() {
                return Err(e.into());
            }

            let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;
            let n = stream.read(&mut self.read_buf).await?;
            if n == 0 {
                tracing::debug!("Connection closed by node");
                return Err(ClientError::ConnectionClosed);
            }
            self.ready.extend(self.parser.feed(&self.read_buf[..n])?);
        }
    }

    /// Returns whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn format(&self) -> Format {
        self.codec.format()
    }

    /// Returns (messages, bytes) written so far.
    pub fn sent(&self) -> (u64, u64) {
        (self.messages_sent, self.bytes_sent)
    }

    /// Closes the connection.
    pub async fn close(&mut self) -> Result<(), ClientError> {
        if let Some(mut stream) = self.stream.take() {
            tracing::debug!("Shutting down writer");
            stream.shutdown().await.ok();
        }
        self.parser.clear();
        self.ready.clear();
        Ok(())
    }
}
