//! Wire message types
//!
//! Control messages are JSON objects with a required uppercase `type` field
//! and optional `streamId`, `offset`, `length`, and `message` fields. Field
//! ordering is not significant.

use serde::{Deserialize, Serialize};

/// The `type` discriminant of a control message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    /// Client request: open a stream for upload
    Start,
    /// Server response: stream opened
    Started,
    /// Client request: finish an upload
    Stop,
    /// Server response: upload finished
    Stopped,
    /// Client request: random-access range read
    Get,
    /// Server response: request failed
    Error,
    /// Any unrecognized `type` value
    #[serde(other, skip_serializing)]
    Unknown,
}

/// A control message, in either direction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlMessage {
    /// Message type discriminant; `None` when the field was absent
    #[serde(rename = "type", skip_serializing_if = "Option::is_none", default)]
    pub message_type: Option<MessageType>,

    /// Stream the message refers to
    #[serde(rename = "streamId", skip_serializing_if = "Option::is_none", default)]
    pub stream_id: Option<String>,

    /// Byte offset for `GET`
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub offset: Option<u64>,

    /// Byte count for `GET`
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub length: Option<u64>,

    /// Human-readable detail on responses
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
}

impl ControlMessage {
    /// Parse a control message from a JSON text frame
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Serialize to a JSON text frame
    ///
    /// Serialization of a response we constructed cannot fail; a fallback
    /// error string keeps the failure observable without poisoning the
    /// connection.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|error| {
            tracing::error!(error = %error, "Failed to serialize control message");
            r#"{"type":"ERROR","message":"Internal server error"}"#.to_string()
        })
    }

    /// Build a `STARTED` response
    pub fn started(stream_id: impl Into<String>) -> Self {
        Self {
            message_type: Some(MessageType::Started),
            stream_id: Some(stream_id.into()),
            offset: None,
            length: None,
            message: Some("Stream started successfully".to_string()),
        }
    }

    /// Build a `STOPPED` response
    pub fn stopped(stream_id: impl Into<String>) -> Self {
        Self {
            message_type: Some(MessageType::Stopped),
            stream_id: Some(stream_id.into()),
            offset: None,
            length: None,
            message: Some("Stream stopped successfully".to_string()),
        }
    }

    /// Build an `ERROR` response
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message_type: Some(MessageType::Error),
            stream_id: None,
            offset: None,
            length: None,
            message: Some(message.into()),
        }
    }

    /// The `streamId` field, rejecting empty values
    pub fn stream_id(&self) -> Option<&str> {
        self.stream_id.as_deref().filter(|id| !id.is_empty())
    }
}
