//! Downstream event consumers.

use std::future::Future;

use kook_proto::{EventData, ProtoError};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// An event delivered by the gateway, in transport order.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    /// Sequence number, when the gateway sent one.
    pub sequence: Option<u64>,
    /// The `d` object exactly as the gateway sent it.
    pub payload: Value,
}

impl InboundEvent {
    /// Typed view of the event header.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not an event object.
    pub fn data(&self) -> Result<EventData, ProtoError> {
        EventData::from_payload(&self.payload)
    }
}

/// Receives decoded events from a gateway session.
///
/// Called once per delivered event. Errors and panics are caught and logged
/// by the session; they never end it. A call still pending when the session
/// stops is dropped, and its sequence number is not recorded, so a resumed
/// session receives the event again.
pub trait EventConsumer: Send + Sync + 'static {
    /// Handle one event.
    fn on_event(&self, event: InboundEvent) -> impl Future<Output = anyhow::Result<()>> + Send;
}

impl EventConsumer for mpsc::Sender<InboundEvent> {
    fn on_event(&self, event: InboundEvent) -> impl Future<Output = anyhow::Result<()>> + Send {
        let tx = self.clone();
        async move {
            tx.send(event)
                .await
                .map_err(|_| anyhow::anyhow!("event receiver dropped"))
        }
    }
}

/// Forwards only user chat messages (kmarkdown and card) to the inner consumer.
#[derive(Debug, Clone)]
pub struct ChatFilter<C> {
    inner: C,
}

impl<C> ChatFilter<C> {
    /// Wrap a consumer.
    pub const fn new(inner: C) -> Self {
        Self { inner }
    }
}

impl<C: EventConsumer> EventConsumer for ChatFilter<C> {
    async fn on_event(&self, event: InboundEvent) -> anyhow::Result<()> {
        match event.data() {
            Ok(data) if data.is_chat_message() => self.inner.on_event(event).await,
            Ok(data) => {
                debug!(sequence = ?event.sequence, kind = ?data.kind(), "skipping non-chat event");
                Ok(())
            }
            Err(e) => {
                debug!(sequence = ?event.sequence, error = %e, "skipping untyped event");
                Ok(())
            }
        }
    }
}

/// Logs every event; used by the binary when no host is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogConsumer;

impl EventConsumer for LogConsumer {
    async fn on_event(&self, event: InboundEvent) -> anyhow::Result<()> {
        match event.data() {
            Ok(data) => info!(
                sequence = ?event.sequence,
                channel_type = ?data.channel_type,
                kind = ?data.kind(),
                target_id = %data.target_id,
                author_id = %data.author_id,
                msg_id = %data.msg_id,
                "event received"
            ),
            Err(_) => info!(sequence = ?event.sequence, payload = %event.payload, "event received"),
        }
        Ok(())
    }
}
