//! Per-connection session state.

use std::net::SocketAddr;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// State owned by one connection worker.
///
/// Never shared between workers, so nothing here needs synchronization.
#[derive(Debug)]
pub struct Session {
    /// Connection ID assigned by the node.
    pub id: String,

    /// Remote address.
    pub remote_addr: SocketAddr,

    /// Messages decoded on this connection.
    messages_received: u64,

    /// Payloads dropped because they failed to decode.
    decode_errors: u64,

    /// Bytes read off the socket.
    bytes_received: u64,

    created_at: Instant,
    last_activity: Instant,
}

impl Session {
    pub fn new(remote_addr: SocketAddr) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4().to_string(),
            remote_addr,
            messages_received: 0,
            decode_errors: 0,
            bytes_received: 0,
            created_at: now,
            last_activity: now,
        }
    }

    /// Records a socket read.
    pub fn record_read(&mut self, n: usize) {
        self.bytes_received += n as u64;
        self.last_activity = Instant::now();
    }

    pub fn record_message(&mut self) {
        self.messages_received += 1;
    }

    pub fn record_decode_error(&mut self) {
        self.decode_errors += 1;
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Time since the connection was accepted.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Time since the last read.
    pub fn idle_duration(&self) -> Duration {
        self.last_activity.elapsed()
    }
}
