//! kook-gateway - KOOK bot gateway client
//!
//! Maintains an ordered event stream from the KOOK gateway over a persistent
//! WebSocket: handshake, heartbeat, resume, forced reconnect and compressed
//! frames are handled here, and decoded events are handed to an
//! [`EventConsumer`]. Outbound text and image messages go through [`KookApi`].

pub mod api;
pub mod config;
pub mod error;
pub mod gateway;

pub use api::{BotToken, Endpoint, KookApi};
pub use config::GatewayConfig;
pub use error::GatewayError;
pub use gateway::{
    ChatFilter, ConnectionState, EventConsumer, InboundEvent, LogConsumer, ReconnectSupervisor,
    SupervisorEvent, SupervisorHandle,
};
