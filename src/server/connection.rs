//! Per-connection frame pump
//!
//! Each accepted socket gets a `Connection`: a reader loop feeding the
//! dispatcher and a writer task draining the outbound channel into the
//! WebSocket sink. The reader never writes to the socket directly, so
//! dispatcher handlers can reply from any task without contending for the
//! sink.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::error::Result;
use crate::protocol::{MessageDispatcher, OutboundFrame};

/// One accepted client connection
pub struct Connection {
    connection_id: String,
    dispatcher: Arc<MessageDispatcher>,
    outbound_queue_depth: usize,
}

impl Connection {
    /// Create a handler for an accepted connection
    pub fn new(
        connection_id: String,
        dispatcher: Arc<MessageDispatcher>,
        outbound_queue_depth: usize,
    ) -> Self {
        Self {
            connection_id,
            dispatcher,
            outbound_queue_depth,
        }
    }

    /// Drive the connection until the peer disconnects
    pub async fn run(self, socket: TcpStream) -> Result<()> {
        let ws = tokio_tungstenite::accept_async(socket).await?;
        tracing::info!(conn = %self.connection_id, "Client connected");

        let (mut sink, mut stream) = ws.split();
        let (tx, mut rx) = mpsc::channel::<OutboundFrame>(self.outbound_queue_depth);

        let writer_conn_id = self.connection_id.clone();
        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                let message = match frame {
                    OutboundFrame::Text(text) => Message::Text(text),
                    OutboundFrame::Binary(data) => Message::Binary(data.to_vec()),
                };
                if let Err(error) = sink.send(message).await {
                    tracing::debug!(
                        conn = %writer_conn_id,
                        error = %error,
                        "Outbound send failed"
                    );
                    break;
                }
            }
            let _ = sink.close().await;
        });

        while let Some(message) = stream.next().await {
            let message = match message {
                Ok(message) => message,
                Err(error) => {
                    tracing::debug!(
                        conn = %self.connection_id,
                        error = %error,
                        "Connection read error"
                    );
                    break;
                }
            };

            match message {
                Message::Text(text) => {
                    self.dispatcher
                        .dispatch_text(&self.connection_id, &text, &tx)
                        .await;
                }
                Message::Binary(data) => {
                    self.dispatcher
                        .dispatch_binary(&self.connection_id, Bytes::from(data), &tx)
                        .await;
                }
                Message::Close(_) => break,
                // Pongs are queued by the protocol layer; nothing to do.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }

        // The stream outlives the connection that fed it; only the binding goes.
        self.dispatcher.connection_closed(&self.connection_id).await;

        drop(tx);
        let _ = writer.await;

        tracing::info!(conn = %self.connection_id, "Client disconnected");
        Ok(())
    }
}
