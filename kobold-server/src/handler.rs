//! Message handlers.

use crate::session::Session;
use kobold_protocol::{Message, Operation};
use std::sync::atomic::{AtomicU64, Ordering};

/// Receives every message a connection worker decodes.
///
/// Called from many workers at once, so implementations must be `Sync`.
pub trait MessageHandler: Send + Sync + 'static {
    fn handle(&self, session: &Session, message: Message);
}

/// Logs each message and counts totals per operation.
///
/// Topic routing is not implemented; this is the node's default sink.
#[derive(Debug, Default)]
pub struct LoggingHandler {
    counts: [AtomicU64; Operation::ALL.len()],
}

impl LoggingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many messages with `op` were handled.
    pub fn count(&self, op: Operation) -> u64 {
        self.counts[op.as_u8() as usize].load(Ordering::Relaxed)
    }

    /// Returns the total across all operations.
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }
}

impl MessageHandler for LoggingHandler {
    fn handle(&self, session: &Session, message: Message) {
        self.counts[message.operation.as_u8() as usize].fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            "[{}] {} topic={} id={} tx_id={:?} content={}B",
            session.remote_addr,
            message.operation,
            message.topic,
            message.id,
            message.transaction_id,
            message.content_len()
        );

        if message.operation == Operation::Unsupported {
            tracing::warn!(
                "[{}] Unsupported operation in message id={}",
                session.remote_addr,
                message.id
            );
        }
    }
}
