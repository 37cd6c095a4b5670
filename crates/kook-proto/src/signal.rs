//! Gateway signal envelope.
//!
//! Every frame on the gateway socket is a JSON object `{"s": kind, "d": data}`;
//! event frames additionally carry the sequence number `sn`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtoError;

/// Hello code for a successful handshake.
pub const HELLO_OK: u32 = 0;
/// Hello code: the bot token is invalid.
pub const HELLO_INVALID_TOKEN: u32 = 40101;
/// Hello code: token verification failed.
pub const HELLO_TOKEN_VERIFICATION_FAILED: u32 = 40102;
/// Hello code: the bot token has expired.
pub const HELLO_TOKEN_EXPIRED: u32 = 40103;

/// Kind of a gateway signal, carried in the `s` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// Application event (`s = 0`), carries `sn`.
    Event,
    /// Handshake result (`s = 1`).
    Hello,
    /// Client heartbeat (`s = 2`).
    Ping,
    /// Heartbeat acknowledgment (`s = 3`).
    Pong,
    /// Client resume request (`s = 4`).
    Resume,
    /// Server instructs the client to start a fresh session (`s = 5`).
    Reconnect,
    /// Server confirms a resumed session (`s = 6`).
    ResumeAck,
    /// Any kind this client does not know about.
    Unknown(u64),
}

impl SignalKind {
    /// Wire value of this kind.
    #[must_use]
    pub const fn code(self) -> u64 {
        match self {
            Self::Event => 0,
            Self::Hello => 1,
            Self::Ping => 2,
            Self::Pong => 3,
            Self::Resume => 4,
            Self::Reconnect => 5,
            Self::ResumeAck => 6,
            Self::Unknown(code) => code,
        }
    }

    /// Map a wire value to a kind.
    #[must_use]
    pub const fn from_code(code: u64) -> Self {
        match code {
            0 => Self::Event,
            1 => Self::Hello,
            2 => Self::Ping,
            3 => Self::Pong,
            4 => Self::Resume,
            5 => Self::Reconnect,
            6 => Self::ResumeAck,
            other => Self::Unknown(other),
        }
    }
}

/// A decoded gateway signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireSignal", into = "WireSignal")]
pub struct Signal {
    /// Signal kind (`s`).
    pub kind: SignalKind,
    /// Sequence number (`sn`), present on events.
    pub sequence: Option<u64>,
    /// Signal-specific payload (`d`).
    pub payload: Value,
}

#[derive(Serialize, Deserialize)]
struct WireSignal {
    s: u64,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    d: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sn: Option<u64>,
}

impl From<WireSignal> for Signal {
    fn from(wire: WireSignal) -> Self {
        Self {
            kind: SignalKind::from_code(wire.s),
            sequence: wire.sn,
            payload: wire.d,
        }
    }
}

impl From<Signal> for WireSignal {
    fn from(signal: Signal) -> Self {
        Self {
            s: signal.kind.code(),
            d: signal.payload,
            sn: signal.sequence,
        }
    }
}

impl Signal {
    /// Create a signal with an empty payload.
    #[must_use]
    pub const fn new(kind: SignalKind) -> Self {
        Self {
            kind,
            sequence: None,
            payload: Value::Null,
        }
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Attach a sequence number.
    #[must_use]
    pub const fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtoError> {
        serde_json::to_string(self).map_err(|e| ProtoError::Encoding(e.to_string()))
    }

    /// Deserialize from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a signal envelope.
    pub fn from_json(json: &str) -> Result<Self, ProtoError> {
        serde_json::from_str(json).map_err(|e| ProtoError::Decoding(e.to_string()))
    }

    /// Interpret the payload of a hello signal.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload has no `code`.
    pub fn hello(&self) -> Result<HelloData, ProtoError> {
        self.payload_as()
    }

    /// Interpret the payload of a resume-ack signal.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload has no `session_id`.
    pub fn resume_ack(&self) -> Result<ResumeAckData, ProtoError> {
        self.payload_as()
    }

    /// Interpret the payload of a reconnect signal. Missing fields default.
    #[must_use]
    pub fn reconnect(&self) -> ReconnectData {
        self.payload_as().unwrap_or_default()
    }

    fn payload_as<T: DeserializeOwned>(&self) -> Result<T, ProtoError> {
        if self.payload.is_null() {
            return Err(ProtoError::MissingField("d"));
        }
        T::deserialize(&self.payload).map_err(|e| ProtoError::Decoding(e.to_string()))
    }
}

/// Payload of a hello signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloData {
    /// Handshake status code; 0 on success.
    pub code: u32,
    /// Session identifier assigned by the gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl HelloData {
    /// Whether the handshake succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code == HELLO_OK
    }

    /// Whether the gateway rejected the credential itself.
    ///
    /// Retrying with the same token cannot succeed.
    #[must_use]
    pub const fn is_credential_error(&self) -> bool {
        matches!(
            self.code,
            HELLO_INVALID_TOKEN | HELLO_TOKEN_VERIFICATION_FAILED | HELLO_TOKEN_EXPIRED
        )
    }
}

/// Payload of a resume-ack signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeAckData {
    /// Identifier of the resumed session.
    pub session_id: String,
}

/// Payload of a reconnect signal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectData {
    /// Reason code.
    #[serde(default)]
    pub code: u32,
    /// Human-readable reason.
    #[serde(default)]
    pub err: String,
}
