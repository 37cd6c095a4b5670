//! Supervisor status events.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::debug;

use super::state::{AtomicConnectionState, ConnectionState};

/// Lifecycle events emitted by the reconnect supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// A session completed its handshake.
    Connected {
        /// Session id assigned or confirmed by the gateway.
        session_id: Option<String>,
        /// Whether an earlier session was resumed.
        resumed: bool,
        /// Wall-clock time of the handshake.
        at: DateTime<Utc>,
    },
    /// A session ended.
    Disconnected {
        /// Why the session ended.
        reason: String,
    },
    /// Waiting before the next attempt.
    Reconnecting {
        /// Consecutive failed attempts so far.
        attempt: u32,
        /// Backoff before the next attempt.
        delay: Duration,
    },
    /// Consecutive failures reached the ceiling; the supervisor stopped.
    ReconnectFailed {
        /// Number of consecutive failed attempts.
        attempts: u32,
        /// Description of the last failure.
        last_error: String,
    },
    /// The gateway rejected the credential; the supervisor stopped.
    CredentialRejected {
        /// Hello status code.
        code: u32,
    },
}

/// Publishes connection state and [`SupervisorEvent`]s.
///
/// Event delivery is best-effort: a full or closed channel drops the event.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    events: Option<mpsc::Sender<SupervisorEvent>>,
    state: Arc<AtomicConnectionState>,
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new(None)
    }
}

impl StatusReporter {
    /// Create a reporter, optionally forwarding events to `events`.
    #[must_use]
    pub fn new(events: Option<mpsc::Sender<SupervisorEvent>>) -> Self {
        Self {
            events,
            state: Arc::new(AtomicConnectionState::new(ConnectionState::Disconnected)),
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.load()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.store(state);
    }

    pub(crate) fn connected(&self, session_id: Option<String>, resumed: bool) {
        self.set_state(ConnectionState::Connected);
        self.emit(SupervisorEvent::Connected {
            session_id,
            resumed,
            at: Utc::now(),
        });
    }

    pub(crate) fn disconnected(&self, reason: String) {
        self.emit(SupervisorEvent::Disconnected { reason });
    }

    pub(crate) fn reconnecting(&self, attempt: u32, delay: Duration) {
        self.set_state(ConnectionState::Reconnecting);
        self.emit(SupervisorEvent::Reconnecting { attempt, delay });
    }

    pub(crate) fn reconnect_failed(&self, attempts: u32, last_error: String) {
        self.set_state(ConnectionState::Failed);
        self.emit(SupervisorEvent::ReconnectFailed {
            attempts,
            last_error,
        });
    }

    pub(crate) fn credential_rejected(&self, code: u32) {
        self.set_state(ConnectionState::Failed);
        self.emit(SupervisorEvent::CredentialRejected { code });
    }

    fn emit(&self, event: SupervisorEvent) {
        if let Some(tx) = &self.events {
            if let Err(e) = tx.try_send(event) {
                debug!(error = %e, "dropping supervisor event");
            }
        }
    }
}
