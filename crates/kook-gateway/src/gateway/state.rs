//! Connection and session state.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;

/// State of the gateway connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected.
    Disconnected,
    /// Resolving the endpoint or waiting for the handshake.
    Connecting,
    /// Handshake completed, events flowing.
    Connected,
    /// Backing off before the next attempt.
    Reconnecting,
    /// Permanently stopped (credential rejected or retries exhausted).
    Failed,
}

/// Atomic wrapper for connection state.
#[derive(Debug)]
pub struct AtomicConnectionState(AtomicU32);

impl AtomicConnectionState {
    /// Create a new atomic state.
    #[must_use]
    pub const fn new(state: ConnectionState) -> Self {
        Self(AtomicU32::new(state as u32))
    }

    /// Load the current state.
    #[must_use]
    pub fn load(&self) -> ConnectionState {
        match self.0.load(Ordering::SeqCst) {
            0 => ConnectionState::Disconnected,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Reconnecting,
            _ => ConnectionState::Failed,
        }
    }

    /// Store a new state.
    pub fn store(&self, state: ConnectionState) {
        self.0.store(state as u32, Ordering::SeqCst);
    }
}

/// What survives a session: enough to ask the gateway for a resume.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumeState {
    /// Session to resume, if any.
    pub session_id: Option<String>,
    /// Highest sequence number delivered to the consumer.
    pub last_sequence: u64,
}

impl ResumeState {
    /// Whether the next lookup should be resume-flavored.
    #[must_use]
    pub const fn can_resume(&self) -> bool {
        self.session_id.is_some()
    }
}

/// Mutable state of one live session.
///
/// The receive loop is the only writer of the session id, the sequence
/// number, the running flag and the ack timestamp. The heartbeat monitor is
/// the only writer of the failure counter and the ping marker.
#[derive(Debug)]
pub struct SessionState {
    session_id: Mutex<Option<String>>,
    last_sequence: AtomicU64,
    sequence_seen: AtomicBool,
    running: AtomicBool,
    last_ack: watch::Sender<Option<Instant>>,
    heartbeat_failures: AtomicU32,
    last_ping_at: Mutex<Option<Instant>>,
}

impl SessionState {
    /// Seed a fresh session from what the previous one left behind.
    #[must_use]
    pub fn new(resume: &ResumeState) -> Self {
        let (last_ack, _) = watch::channel(None);
        Self {
            session_id: Mutex::new(resume.session_id.clone()),
            last_sequence: AtomicU64::new(resume.last_sequence),
            sequence_seen: AtomicBool::new(resume.last_sequence > 0),
            running: AtomicBool::new(false),
            last_ack,
            heartbeat_failures: AtomicU32::new(0),
            last_ping_at: Mutex::new(None),
        }
    }

    /// Current session id.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().clone()
    }

    pub(crate) fn set_session_id(&self, session_id: String) {
        *self.session_id.lock() = Some(session_id);
    }

    /// Forget the session entirely; the next connect starts fresh.
    pub(crate) fn clear_session(&self) {
        *self.session_id.lock() = None;
        self.last_sequence.store(0, Ordering::SeqCst);
        self.sequence_seen.store(false, Ordering::SeqCst);
    }

    /// Highest sequence number delivered so far.
    #[must_use]
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::SeqCst)
    }

    /// Whether `sequence` was already delivered, or is older than what was.
    ///
    /// A fresh session has seen nothing, so `sn = 0` is accepted once.
    #[must_use]
    pub fn is_stale(&self, sequence: u64) -> bool {
        self.sequence_seen.load(Ordering::SeqCst) && sequence <= self.last_sequence()
    }

    /// Move the sequence number forward. Returns false if `sequence` would
    /// not advance it.
    pub(crate) fn advance_sequence(&self, sequence: u64) -> bool {
        let seen = self.sequence_seen.swap(true, Ordering::SeqCst);
        let previous = self.last_sequence.fetch_max(sequence, Ordering::SeqCst);
        !seen || previous < sequence
    }

    /// Whether the receive loop is live.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub(crate) fn record_ack(&self, at: Instant) {
        self.last_ack.send_replace(Some(at));
    }

    /// When the last heartbeat ack arrived.
    #[must_use]
    pub fn last_ack_at(&self) -> Option<Instant> {
        *self.last_ack.borrow()
    }

    pub(crate) fn subscribe_acks(&self) -> watch::Receiver<Option<Instant>> {
        self.last_ack.subscribe()
    }

    /// Consecutive heartbeats without a timely ack.
    #[must_use]
    pub fn heartbeat_failures(&self) -> u32 {
        self.heartbeat_failures.load(Ordering::SeqCst)
    }

    pub(crate) fn record_heartbeat_miss(&self) -> u32 {
        self.heartbeat_failures.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn reset_heartbeat_failures(&self) {
        self.heartbeat_failures.store(0, Ordering::SeqCst);
    }

    /// When the last ping was sent.
    #[must_use]
    pub fn last_ping_at(&self) -> Option<Instant> {
        *self.last_ping_at.lock()
    }

    pub(crate) fn mark_ping_sent(&self, at: Instant) {
        *self.last_ping_at.lock() = Some(at);
    }

    /// Snapshot of the fields carried into the next session.
    #[must_use]
    pub fn resume_state(&self) -> ResumeState {
        ResumeState {
            session_id: self.session_id(),
            last_sequence: self.last_sequence(),
        }
    }
}
