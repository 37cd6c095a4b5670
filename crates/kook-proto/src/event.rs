//! Event payload header.
//!
//! Only the routing fields common to every event are typed. Message content
//! (kmarkdown, cards) and the `extra` object are passed through untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtoError;

/// Where an event originated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelType {
    /// Guild channel.
    Group,
    /// Direct message.
    Person,
    /// Server-wide broadcast.
    Broadcast,
    /// Anything newer than this client, or absent.
    #[default]
    #[serde(other)]
    Other,
}

/// Message type code of an event (`type` field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Plain text (1).
    Text,
    /// Image (2).
    Image,
    /// Video (3).
    Video,
    /// File (4).
    File,
    /// Audio (8).
    Audio,
    /// KMarkdown text (9).
    KMarkdown,
    /// Card message (10).
    Card,
    /// System notification (255).
    System,
    /// Unrecognised code.
    Other(u32),
}

impl MessageKind {
    /// Wire value of this kind.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Text => 1,
            Self::Image => 2,
            Self::Video => 3,
            Self::File => 4,
            Self::Audio => 8,
            Self::KMarkdown => 9,
            Self::Card => 10,
            Self::System => 255,
            Self::Other(code) => code,
        }
    }

    /// Map a wire value to a kind.
    #[must_use]
    pub const fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Text,
            2 => Self::Image,
            3 => Self::Video,
            4 => Self::File,
            8 => Self::Audio,
            9 => Self::KMarkdown,
            10 => Self::Card,
            255 => Self::System,
            other => Self::Other(other),
        }
    }
}

/// Header of an event payload (`d` of an `s = 0` signal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    /// Origin of the event.
    #[serde(default)]
    pub channel_type: ChannelType,
    /// Raw message type code; see [`EventData::kind`].
    #[serde(rename = "type", default)]
    pub type_code: u32,
    /// Channel or user the event targets.
    #[serde(default)]
    pub target_id: String,
    /// Sender of the event.
    #[serde(default)]
    pub author_id: String,
    /// Message body, format depends on the kind.
    #[serde(default)]
    pub content: String,
    /// Message identifier.
    #[serde(default)]
    pub msg_id: String,
    /// Millisecond timestamp.
    #[serde(default)]
    pub msg_timestamp: i64,
    /// Client-provided nonce echoed back by the server.
    #[serde(default)]
    pub nonce: String,
    /// Type-specific extras, passed through as-is.
    #[serde(default)]
    pub extra: Value,
}

impl EventData {
    /// Typed view of a raw event payload (`d`). Missing fields take their
    /// defaults; only a non-object payload or a mistyped field fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not fit the event header.
    pub fn from_payload(payload: &Value) -> Result<Self, ProtoError> {
        Self::deserialize(payload).map_err(|e| ProtoError::Decoding(e.to_string()))
    }

    /// Decoded message kind.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        MessageKind::from_code(self.type_code)
    }

    /// Whether this is a user chat message (kmarkdown text or card).
    #[must_use]
    pub const fn is_chat_message(&self) -> bool {
        matches!(self.kind(), MessageKind::KMarkdown | MessageKind::Card)
    }

    /// Whether this is a system notification rather than a message.
    #[must_use]
    pub const fn is_system(&self) -> bool {
        matches!(self.kind(), MessageKind::System)
    }
}
