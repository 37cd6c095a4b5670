//! # kook-proto
//!
//! Protocol definitions for the KOOK bot gateway: the signal envelope carried
//! over the WebSocket, the frame codec (including compressed binary frames),
//! and the JSON shapes of the HTTP API calls the gateway client makes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod codec;
pub mod error;
pub mod event;
pub mod signal;

pub use api::{ApiEnvelope, CreateMessageRequest, GatewayIndex, MessageReceipt};
pub use codec::{FrameCodec, encode_ping};
pub use error::ProtoError;
pub use event::{ChannelType, EventData, MessageKind};
pub use signal::{HelloData, ReconnectData, ResumeAckData, Signal, SignalKind};
