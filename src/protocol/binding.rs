//! Connection-to-stream binding
//!
//! While a connection is uploading, its binary frames are appended to
//! exactly one stream. The binding records that association; it is created
//! by `START`, cleared by `STOP`, and dropped when the connection closes.

use std::collections::HashMap;

use tokio::sync::Mutex;

/// Map of connection id to the stream its binary frames feed
#[derive(Default)]
pub struct ConnectionBinding {
    bindings: Mutex<HashMap<String, String>>,
}

impl ConnectionBinding {
    /// Create an empty binding table
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection to a stream, replacing any previous binding
    pub async fn bind(&self, connection_id: &str, stream_id: &str) {
        let mut bindings = self.bindings.lock().await;
        bindings.insert(connection_id.to_string(), stream_id.to_string());
    }

    /// Remove a connection's binding, returning the stream it was bound to
    pub async fn unbind(&self, connection_id: &str) -> Option<String> {
        let mut bindings = self.bindings.lock().await;
        bindings.remove(connection_id)
    }

    /// The stream a connection is currently bound to
    pub async fn stream_for(&self, connection_id: &str) -> Option<String> {
        let bindings = self.bindings.lock().await;
        bindings.get(connection_id).cloned()
    }

    /// Number of live bindings
    pub async fn len(&self) -> usize {
        self.bindings.lock().await.len()
    }

    /// Whether no connection is currently bound
    pub async fn is_empty(&self) -> bool {
        self.bindings.lock().await.is_empty()
    }
}
