//! Messages pushed from the server to admin gateway clients.
//!
//! Every frame is a JSON object `{ "type": <EventType>, "payload": <any> }`.

use serde::{Deserialize, Serialize};

use crate::models::ContentKind;

/// Event type tag of a gateway message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Sent once, right before the server closes a rejected handshake.
    AuthFailed,
    PostCreate,
    PostUpdate,
    PostDelete,
    NoteCreate,
    NoteUpdate,
    NoteDelete,
    PageCreate,
    PageUpdate,
    PageDelete,
}

/// What happened to a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentChange {
    Create,
    Update,
    Delete,
}

impl EventType {
    /// The event announcing `change` on an item of `kind`.
    pub fn for_content(kind: ContentKind, change: ContentChange) -> Self {
        use ContentChange::*;
        match (kind, change) {
            (ContentKind::Post, Create) => EventType::PostCreate,
            (ContentKind::Post, Update) => EventType::PostUpdate,
            (ContentKind::Post, Delete) => EventType::PostDelete,
            (ContentKind::Note, Create) => EventType::NoteCreate,
            (ContentKind::Note, Update) => EventType::NoteUpdate,
            (ContentKind::Note, Delete) => EventType::NoteDelete,
            (ContentKind::Page, Create) => EventType::PageCreate,
            (ContentKind::Page, Update) => EventType::PageUpdate,
            (ContentKind::Page, Delete) => EventType::PageDelete,
        }
    }
}

/// A single frame sent to an admin gateway client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayMessage {
    #[serde(rename = "type")]
    pub event: EventType,
    pub payload: serde_json::Value,
}

impl GatewayMessage {
    /// Create a message, serializing `payload` to JSON. Payloads that fail
    /// to serialize are sent as `null`.
    pub fn new(event: EventType, payload: impl Serialize) -> Self {
        Self {
            event,
            payload: serde_json::to_value(payload).unwrap_or_default(),
        }
    }

    /// The rejection notice sent before closing an unauthenticated socket.
    pub fn auth_failed(reason: impl Into<String>) -> Self {
        Self {
            event: EventType::AuthFailed,
            payload: serde_json::Value::String(reason.into()),
        }
    }

    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
