//! TCP node implementation.

use crate::config::Config;
use crate::error::ServerError;
use crate::handler::{LoggingHandler, MessageHandler};
use crate::session::Session;
use kobold_protocol::{Codec, StreamParser};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Node-wide counters, updated concurrently by every connection worker.
#[derive(Debug, Default)]
pub struct NodeStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub connections_rejected: AtomicU64,
    pub messages_total: AtomicU64,
    pub decode_errors_total: AtomicU64,
    pub bytes_total: AtomicU64,
    pub errors_total: AtomicU64,
}

/// Accepts connections and runs one worker per connection.
pub struct Node {
    config: Config,
    handler: Arc<dyn MessageHandler>,
    stats: Arc<NodeStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
    local_addr: std::sync::Mutex<Option<SocketAddr>>,
}

/// Why a connection worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disconnect {
    /// The peer closed the stream.
    Eof,
    /// No data arrived within the idle timeout.
    Idle,
}

impl Node {
    /// Creates a node that logs every message it receives.
    pub fn new(config: Config) -> Self {
        Self::with_handler(config, Arc::new(LoggingHandler::new()))
    }

    pub fn with_handler(config: Config, handler: Arc<dyn MessageHandler>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            handler,
            stats: Arc::new(NodeStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
            local_addr: std::sync::Mutex::new(None),
        }
    }

    /// Binds the listener and serves until [`Node::shutdown`] is called.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.network.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serves on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        if let Ok(mut addr) = self.local_addr.lock() {
            *addr = Some(local_addr);
        }
        let mut shutdown_rx = self.shutdown.subscribe();
        self.running.store(true, Ordering::SeqCst);

        tracing::info!(
            "Node listening on {} (format={})",
            local_addr,
            self.config.protocol.format
        );

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((tcp_stream, addr)) => {
                            if self.stats.connections_active.load(Ordering::Relaxed)
                                >= self.config.network.max_connections as u64
                            {
                                tracing::warn!("Connection limit reached, rejecting {}", addr);
                                self.stats.connections_rejected.fetch_add(1, Ordering::Relaxed);
                                continue;
                            }

                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);
                            tcp_stream.set_nodelay(true).ok();

                            let handler = self.handler.clone();
                            let stats = self.stats.clone();
                            let config = self.config.clone();
                            let mut conn_shutdown = self.shutdown.subscribe();

                            tokio::spawn(async move {
                                let mut session = Session::new(addr);
                                tracing::info!("Client connected: {} (conn_id={})", addr, session.id);

                                let result = Self::handle_connection(
                                    tcp_stream,
                                    &mut session,
                                    handler.as_ref(),
                                    &stats,
                                    &config,
                                    &mut conn_shutdown,
                                )
                                .await;

                                match result {
                                    Ok(Disconnect::Eof) => {}
                                    Ok(Disconnect::Idle) => {
                                        tracing::info!("[{}] Idle timeout", addr);
                                    }
                                    Err(ServerError::ShuttingDown) => {}
                                    Err(e) => {
                                        tracing::warn!("Connection {} error: {}", addr, e);
                                        stats.errors_total.fetch_add(1, Ordering::Relaxed);
                                    }
                                }

                                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                                tracing::info!(
                                    "Client disconnected: {} (received {} messages, {} bytes)",
                                    addr,
                                    session.messages_received(),
                                    session.bytes_received()
                                );
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Node shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Reads from one connection until it closes, feeding its own parser and
    /// passing every decoded message to the handler.
    ///
    /// Decode failures drop the offending message only. A frame larger than
    /// the configured maximum or a read error ends the connection.
    pub async fn handle_connection<S>(
        mut stream: S,
        session: &mut Session,
        handler: &dyn MessageHandler,
        stats: &NodeStats,
        config: &Config,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<Disconnect, ServerError>
    where
        S: AsyncRead + Unpin,
    {
        let addr = session.remote_addr;
        let codec = Codec::new(config.protocol.format)
            .with_max_message_size(config.protocol.max_message_size);
        let mut parser =
            StreamParser::new().with_max_frame_size(config.protocol.max_message_size);
        let mut buf = vec![0u8; config.network.read_buffer_size];
        let idle_timeout = config.network.idle_timeout();

        loop {
            tokio::select! {
                result = stream.read(&mut buf) => {
                    let n = match result {
                        Ok(0) => {
                            if parser.buffered() > 0 {
                                tracing::debug!(
                                    "[{}] Dropping {} bytes of partial frame",
                                    addr,
                                    parser.buffered()
                                );
                            }
                            tracing::debug!("[{}] Connection closed by client", addr);
                            return Ok(Disconnect::Eof);
                        }
                        Ok(n) => n,
                        Err(e) => {
                            tracing::debug!("[{}] Read error: {}", addr, e);
                            return Err(ServerError::Io(e));
                        }
                    };

                    tracing::debug!("[{}] Received {} bytes", addr, n);
                    session.record_read(n);
                    stats.bytes_total.fetch_add(n as u64, Ordering::Relaxed);

                    for payload in parser.feed(&buf[..n])? {
                        match codec.deserialize(&payload) {
                            Ok(message) => {
                                session.record_message();
                                stats.messages_total.fetch_add(1, Ordering::Relaxed);
                                handler.handle(session, message);
                            }
                            Err(e) => {
                                tracing::warn!(
                                    "[{}] Dropping {} byte payload: {}",
                                    addr,
                                    payload.len(),
                                    e
                                );
                                session.record_decode_error();
                                stats.decode_errors_total.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }

                    // Frames ahead of an oversized prefix are handled first
                    if let Some(e) = parser.rejected() {
                        return Err(e.into());
                    }
                }

                _ = idle_sleep(idle_timeout) => {
                    if idle_timeout.is_some_and(|t| session.idle_duration() >= t) {
                        return Ok(Disconnect::Idle);
                    }
                }

                _ = shutdown.recv() => {
                    tracing::debug!("[{}] Shutdown signal received", addr);
                    return Err(ServerError::ShuttingDown);
                }
            }
        }
    }

    /// Initiates node shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the node is accepting connections.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns the bound address once the node is serving.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.lock().ok().and_then(|addr| *addr)
    }

    /// Returns node statistics.
    pub fn stats(&self) -> &NodeStats {
        &self.stats
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

async fn idle_sleep(timeout: Option<Duration>) {
    match timeout {
        Some(t) => tokio::time::sleep(t).await,
        None => std::future::pending().await,
    }
}
