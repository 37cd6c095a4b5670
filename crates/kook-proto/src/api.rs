//! HTTP API wire types.
//!
//! Every KOOK API response is wrapped as `{"code": 0, "message": "...", "data": ...}`;
//! a non-zero `code` is an application-level failure even on HTTP 200.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtoError;
use crate::event::MessageKind;

/// Response envelope shared by all API calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope {
    /// Application status code; 0 on success.
    pub code: i64,
    /// Human-readable status.
    #[serde(default)]
    pub message: String,
    /// Call-specific payload.
    #[serde(default)]
    pub data: Value,
}

impl ApiEnvelope {
    /// Whether the call succeeded at the application level.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code == 0
    }

    /// Parse the payload into the call-specific type.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` does not match `T`.
    pub fn into_data<T: DeserializeOwned>(self) -> Result<T, ProtoError> {
        serde_json::from_value(self.data).map_err(|e| ProtoError::Decoding(e.to_string()))
    }
}

/// Payload of `GET /gateway/index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayIndex {
    /// WebSocket URL to connect to.
    pub url: String,
}

/// Body of `POST /message/create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMessageRequest {
    /// Channel to post into.
    pub target_id: String,
    /// Text, or image URL for image messages.
    pub content: String,
    /// Message type code (1 text, 2 image).
    #[serde(rename = "type")]
    pub type_code: u32,
}

impl CreateMessageRequest {
    /// A plain text message.
    #[must_use]
    pub fn text(target_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            content: content.into(),
            type_code: MessageKind::Text.code(),
        }
    }

    /// An image message referencing an already-hosted image.
    #[must_use]
    pub fn image(target_id: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            content: image_url.into(),
            type_code: MessageKind::Image.code(),
        }
    }
}

/// Payload of a successful `POST /message/create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReceipt {
    /// Identifier of the created message.
    pub msg_id: String,
    /// Millisecond timestamp assigned by the server.
    #[serde(default)]
    pub msg_timestamp: i64,
    /// Nonce echoed by the server.
    #[serde(default)]
    pub nonce: String,
}
