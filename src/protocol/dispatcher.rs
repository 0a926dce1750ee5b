//! Protocol dispatcher
//!
//! Translates inbound frames into registry operations and outbound frames.
//! One dispatcher serves every connection; per-connection state is only the
//! binding entry, so handlers may run on any task.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::registry::{RegistryError, StreamRegistry};

use super::binding::ConnectionBinding;
use super::message::{ControlMessage, MessageType};

/// A frame queued for delivery to one connection
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    /// JSON control message
    Text(String),
    /// Raw payload bytes
    Binary(Bytes),
}

/// Dispatcher for control and payload frames
///
/// Every failure is answered with an `ERROR` control message on the
/// offending connection; the connection itself is never torn down here.
pub struct MessageDispatcher {
    registry: Arc<StreamRegistry>,
    bindings: ConnectionBinding,
}

impl MessageDispatcher {
    /// Create a dispatcher over a registry
    pub fn new(registry: Arc<StreamRegistry>) -> Self {
        Self {
            registry,
            bindings: ConnectionBinding::new(),
        }
    }

    /// The registry this dispatcher mutates
    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }

    /// Handle a text (JSON control) frame
    pub async fn dispatch_text(
        &self,
        connection_id: &str,
        text: &str,
        replies: &mpsc::Sender<OutboundFrame>,
    ) {
        tracing::debug!(conn = %connection_id, message = %text, "Received text message");

        let msg = match ControlMessage::from_json(text) {
            Ok(msg) => msg,
            Err(error) => {
                tracing::warn!(conn = %connection_id, error = %error, "JSON parse error");
                self.send_error(replies, "Invalid JSON format").await;
                return;
            }
        };

        match msg.message_type {
            None => {
                self.send_error(replies, "Missing 'type' field in message")
                    .await;
            }
            Some(MessageType::Start) => self.handle_start(connection_id, &msg, replies).await,
            Some(MessageType::Stop) => self.handle_stop(connection_id, &msg, replies).await,
            Some(MessageType::Get) => self.handle_get(connection_id, &msg, replies).await,
            Some(_) => {
                self.send_error(replies, "Unknown message type").await;
            }
        }
    }

    /// Handle a binary (payload) frame
    pub async fn dispatch_binary(
        &self,
        connection_id: &str,
        data: Bytes,
        replies: &mpsc::Sender<OutboundFrame>,
    ) {
        let Some(stream_id) = self.bindings.stream_for(connection_id).await else {
            tracing::warn!(conn = %connection_id, "Binary frame with no bound stream");
            self.send_error(replies, "No active stream for binary data")
                .await;
            return;
        };

        match self.registry.write_chunk(&stream_id, &data).await {
            Ok(()) => {
                tracing::debug!(
                    conn = %connection_id,
                    stream = %stream_id,
                    bytes = data.len(),
                    "Appended chunk"
                );
            }
            Err(error) => {
                tracing::error!(
                    conn = %connection_id,
                    stream = %stream_id,
                    error = %error,
                    "Chunk append failed"
                );
                self.send_error(replies, format!("Failed to write data to stream: {stream_id}"))
                    .await;
            }
        }
    }

    /// Drop a closing connection's binding; its stream stays registered
    pub async fn connection_closed(&self, connection_id: &str) {
        if let Some(stream_id) = self.bindings.unbind(connection_id).await {
            tracing::info!(
                conn = %connection_id,
                stream = %stream_id,
                "Connection closed with active binding"
            );
        }
    }

    async fn handle_start(
        &self,
        connection_id: &str,
        msg: &ControlMessage,
        replies: &mpsc::Sender<OutboundFrame>,
    ) {
        let Some(stream_id) = msg.stream_id() else {
            self.send_error(replies, "Missing 'streamId' field in START message")
                .await;
            return;
        };

        if let Some(bound) = self.bindings.stream_for(connection_id).await {
            self.send_error(replies, format!("Connection already bound to stream {bound}"))
                .await;
            return;
        }

        match self.registry.create_stream(stream_id).await {
            Ok(()) => {
                self.bindings.bind(connection_id, stream_id).await;
                tracing::info!(conn = %connection_id, stream = %stream_id, "Stream started");
                self.send(replies, ControlMessage::started(stream_id)).await;
            }
            Err(error) => {
                tracing::warn!(
                    conn = %connection_id,
                    stream = %stream_id,
                    error = %error,
                    "Stream creation failed"
                );
                self.send_error(replies, format!("Failed to create stream: {stream_id}"))
                    .await;
            }
        }
    }

    async fn handle_stop(
        &self,
        connection_id: &str,
        msg: &ControlMessage,
        replies: &mpsc::Sender<OutboundFrame>,
    ) {
        let Some(stream_id) = msg.stream_id() else {
            self.send_error(replies, "Missing 'streamId' field in STOP message")
                .await;
            return;
        };

        match self.bindings.stream_for(connection_id).await {
            None => {
                self.send_error(replies, "No active stream for connection")
                    .await;
            }
            Some(bound) if bound != stream_id => {
                self.send_error(
                    replies,
                    format!("Stream {stream_id} is not bound to this connection"),
                )
                .await;
            }
            Some(_) => {
                // The binding goes regardless of finalization outcome, so a
                // broken stream cannot wedge the connection.
                self.bindings.unbind(connection_id).await;
                match self.registry.finalize_stream(stream_id).await {
                    Ok(()) => {
                        tracing::info!(conn = %connection_id, stream = %stream_id, "Stream stopped");
                        self.send(replies, ControlMessage::stopped(stream_id)).await;
                    }
                    Err(error) => {
                        tracing::error!(
                            conn = %connection_id,
                            stream = %stream_id,
                            error = %error,
                            "Stream finalization failed"
                        );
                        self.send_error(replies, format!("Failed to finalize stream: {stream_id}"))
                            .await;
                    }
                }
            }
        }
    }

    async fn handle_get(
        &self,
        connection_id: &str,
        msg: &ControlMessage,
        replies: &mpsc::Sender<OutboundFrame>,
    ) {
        let (Some(stream_id), Some(offset), Some(length)) =
            (msg.stream_id(), msg.offset, msg.length)
        else {
            self.send_error(
                replies,
                "Missing required fields in GET message (streamId, offset, length)",
            )
            .await;
            return;
        };

        match self
            .registry
            .read_chunk(stream_id, offset, length as usize)
            .await
        {
            Ok(data) if !data.is_empty() => {
                tracing::debug!(
                    conn = %connection_id,
                    stream = %stream_id,
                    offset = offset,
                    bytes = data.len(),
                    "Served range read"
                );
                if replies.send(OutboundFrame::Binary(data)).await.is_err() {
                    tracing::debug!(conn = %connection_id, "Connection gone, dropping read reply");
                }
            }
            Ok(_) => {
                self.send_error(replies, format!("Failed to read from stream: {stream_id}"))
                    .await;
            }
            Err(RegistryError::EndOfStream(_)) => {
                tracing::debug!(
                    conn = %connection_id,
                    stream = %stream_id,
                    offset = offset,
                    "Read past end of stream"
                );
                self.send_error(replies, "No data available").await;
            }
            Err(error) => {
                tracing::error!(
                    conn = %connection_id,
                    stream = %stream_id,
                    error = %error,
                    "Range read failed"
                );
                self.send_error(replies, format!("Failed to read from stream: {stream_id}"))
                    .await;
            }
        }
    }

    async fn send(&self, replies: &mpsc::Sender<OutboundFrame>, msg: ControlMessage) {
        if replies
            .send(OutboundFrame::Text(msg.to_json()))
            .await
            .is_err()
        {
            tracing::debug!("Connection gone, dropping control reply");
        }
    }

    async fn send_error(&self, replies: &mpsc::Sender<OutboundFrame>, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(message = %message, "Sending error response");
        self.send(replies, ControlMessage::error(message)).await;
    }
}
