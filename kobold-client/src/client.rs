//! High-level client API.

use crate::connection::{Connection, ConnectionConfig};
use crate::error::ClientError;
use kobold_protocol::{Format, Message, Metadata, Operation};
use uuid::Uuid;

/// High-level client for a kobold node.
///
/// Assigns message ids from a per-client counter and stamps every outgoing
/// message with the client's metadata.
pub struct Client {
    conn: Connection,
    client_id: String,
    connection_id: String,
    token: Option<String>,
    next_id: u64,
}

impl Client {
    /// Creates a new client with the given configuration.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            conn: Connection::new(config),
            client_id: Uuid::new_v4().to_string(),
            connection_id: String::new(),
            token: None,
            next_id: 1,
        }
    }

    /// Overrides the generated client id.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Attaches an opaque token to outgoing metadata.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Connects to the node. Each connect gets a fresh connection id.
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        self.conn.connect().await?;
        self.connection_id = Uuid::new_v4().to_string();
        tracing::debug!(
            "Client {} connected (conn_id={})",
            self.client_id,
            self.connection_id
        );
        Ok(())
    }

    /// Returns whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn format(&self) -> Format {
        self.conn.format()
    }

    /// Closes the connection.
    pub async fn close(&mut self) -> Result<(), ClientError> {
        self.conn.close().await
    }

    /// Builds a message with the next id and this client's metadata.
    pub fn message(&mut self, op: Operation, topic: impl Into<String>) -> Message {
        let id = self.next_id.to_string();
        self.next_id += 1;

        let mut metadata = Metadata::new(&self.client_id, &self.connection_id);
        if let Some(token) = &self.token {
            metadata = metadata.with_token(token);
        }
        Message::new(id, op, topic).with_metadata(metadata)
    }

    /// Publishes `content` on `topic`. Returns the message id.
    pub async fn publish(
        &mut self,
        topic: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Result<String, ClientError> {
        let message = self.message(Operation::Publish, topic).with_content(content);
        self.conn.send(&message).await?;
        Ok(message.id)
    }

    /// Sends an arbitrary operation. Returns the message id.
    pub async fn send(
        &mut self,
        op: Operation,
        topic: impl Into<String>,
        content: Option<Vec<u8>>,
        transaction_id: Option<String>,
    ) -> Result<String, ClientError> {
        let mut message = self.message(op, topic);
        if let Some(content) = content {
            message = message.with_content(content);
        }
        if let Some(tx_id) = transaction_id {
            message = message.with_transaction_id(tx_id);
        }
        self.conn.send(&message).await?;
        Ok(message.id)
    }

    /// Waits for the next message from the node.
    pub async fn recv(&mut self) -> Result<Message, ClientError> {
        self.conn.recv().await
    }
}
