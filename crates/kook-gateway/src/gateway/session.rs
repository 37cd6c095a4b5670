//! One physical gateway connection.
//!
//! A session dials the socket, waits for the hello handshake, then runs the
//! receive loop: every frame is decoded and dispatched, and heartbeat pings
//! queued by the monitor are written out. The session ends on a clean stop,
//! a reconnect command, heartbeat death, a handshake failure or a transport
//! error. Teardown always stops the heartbeat and closes the socket.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, Sink, SinkExt, Stream, StreamExt};
use kook_proto::{FrameCodec, Signal, SignalKind};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::consumer::{EventConsumer, InboundEvent};
use super::events::StatusReporter;
use super::heartbeat::{start_heartbeat_task, HeartbeatConfig};
use super::state::{ResumeState, SessionState};

/// Runtime settings for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Upper bound of a single receive wait.
    pub receive_timeout: Duration,
    /// Timeout for dialing the socket.
    pub connect_timeout: Duration,
    /// How long to wait for the hello signal after connecting.
    pub handshake_timeout: Duration,
    /// Whether binary frames are compressed.
    pub compression: bool,
    /// Largest accepted frame, compressed or inflated.
    pub max_message_size: usize,
    /// Heartbeat settings.
    pub heartbeat: HeartbeatConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            receive_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(6),
            compression: true,
            max_message_size: kook_proto::codec::DEFAULT_MAX_FRAME_SIZE,
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

impl SessionConfig {
    fn codec(&self) -> FrameCodec {
        FrameCodec::new(self.compression, self.max_message_size)
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Stopped from outside (shutdown or recycle).
    Closed,
    /// The peer closed the socket.
    ConnectionClosed,
    /// Reading or writing the socket failed.
    Transport(String),
    /// The heartbeat monitor gave up.
    HeartbeatDead,
    /// The gateway asked for a fresh session.
    ReconnectRequested {
        /// Reason code sent by the gateway.
        code: u32,
    },
    /// Hello carried a non-zero, non-credential code.
    HandshakeFailed {
        /// Hello status code.
        code: u32,
    },
    /// No hello arrived in time.
    HandshakeTimeout,
    /// Hello rejected the credential.
    CredentialRejected {
        /// Hello status code.
        code: u32,
    },
    /// The socket could not be opened.
    ConnectFailed(String),
    /// The endpoint lookup failed; no socket was opened.
    LocatorFailed(String),
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("session stopped"),
            Self::ConnectionClosed => f.write_str("connection closed by gateway"),
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::HeartbeatDead => f.write_str("heartbeat timed out"),
            Self::ReconnectRequested { code } => write!(f, "gateway requested reconnect ({code})"),
            Self::HandshakeFailed { code } => write!(f, "handshake failed ({code})"),
            Self::HandshakeTimeout => f.write_str("handshake timed out"),
            Self::CredentialRejected { code } => write!(f, "credential rejected ({code})"),
            Self::ConnectFailed(e) => write!(f, "connect failed: {e}"),
            Self::LocatorFailed(e) => write!(f, "gateway lookup failed: {e}"),
        }
    }
}

/// How the supervisor should treat a finished attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptClass {
    /// The handshake completed; reset backoff.
    Success,
    /// Ordinary failure; back off and retry.
    Failure,
    /// Stopped from outside before the handshake; neither success nor
    /// failure.
    Interrupted,
    /// Retrying cannot help.
    Fatal {
        /// Hello status code.
        code: u32,
    },
}

/// Result of one connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    /// Why the session ended.
    pub end: SessionEnd,
    /// Whether hello(0) or resume-ack was received.
    pub handshake_completed: bool,
    /// Resume parameters for the next attempt.
    pub resume: ResumeState,
}

impl SessionOutcome {
    /// Outcome of an attempt that never opened a socket.
    #[must_use]
    pub const fn not_started(end: SessionEnd, resume: ResumeState) -> Self {
        Self {
            end,
            handshake_completed: false,
            resume,
        }
    }

    /// Classify the attempt for backoff purposes.
    #[must_use]
    pub const fn classify(&self) -> AttemptClass {
        match self.end {
            SessionEnd::CredentialRejected { code } => AttemptClass::Fatal { code },
            _ if self.handshake_completed => AttemptClass::Success,
            SessionEnd::Closed => AttemptClass::Interrupted,
            _ => AttemptClass::Failure,
        }
    }
}

/// A single gateway connection.
pub struct GatewaySession<C> {
    config: SessionConfig,
    state: Arc<SessionState>,
    consumer: Arc<C>,
    cancel: CancellationToken,
    reporter: StatusReporter,
    resuming: bool,
    handshake_completed: bool,
}

impl<C: EventConsumer> GatewaySession<C> {
    /// Create a session seeded with the previous session's resume state.
    ///
    /// Cancelling `cancel` stops the session.
    #[must_use]
    pub fn new(
        config: SessionConfig,
        resume: &ResumeState,
        consumer: Arc<C>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state: Arc::new(SessionState::new(resume)),
            consumer,
            cancel,
            reporter: StatusReporter::default(),
            resuming: resume.can_resume(),
            handshake_completed: false,
        }
    }

    /// Report handshakes through `reporter`.
    #[must_use]
    pub fn with_reporter(mut self, reporter: StatusReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Shared session state.
    #[must_use]
    pub fn state(&self) -> Arc<SessionState> {
        Arc::clone(&self.state)
    }

    /// Dial `url` and run the session to completion.
    pub async fn run(self, url: &str) -> SessionOutcome {
        debug!("connecting to gateway");
        let dial = timeout(self.config.connect_timeout, connect_async(url));
        let connected = tokio::select! {
            () = self.cancel.cancelled() => return self.finish_early(SessionEnd::Closed),
            connected = dial => connected,
        };

        let stream = match connected {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => return self.finish_early(SessionEnd::ConnectFailed(e.to_string())),
            Err(_) => {
                let after = self.config.connect_timeout;
                return self.finish_early(SessionEnd::ConnectFailed(format!(
                    "timed out after {after:?}"
                )));
            }
        };

        let (write, read) = stream.split();
        self.drive(read, write).await
    }

    /// Run the receive loop over an already-open transport.
    pub async fn drive<R, W>(mut self, mut read: R, mut write: W) -> SessionOutcome
    where
        R: Stream<Item = Result<Message, WsError>> + Unpin,
        W: Sink<Message> + Unpin,
        W::Error: fmt::Display,
    {
        let (ping_tx, mut ping_rx) = mpsc::channel::<Message>(8);
        self.state.set_running(true);
        let heartbeat = start_heartbeat_task(
            Arc::clone(&self.state),
            ping_tx,
            self.config.heartbeat.clone(),
            self.cancel.clone(),
        );

        let codec = self.config.codec();
        debug!(
            compression = codec.compression(),
            max_frame_size = codec.max_frame_size(),
            "receive loop started"
        );
        let receive_timeout = self.config.receive_timeout;
        let handshake_deadline = sleep(self.config.handshake_timeout);
        tokio::pin!(handshake_deadline);

        let end = loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    break if heartbeat.is_dead() {
                        SessionEnd::HeartbeatDead
                    } else {
                        SessionEnd::Closed
                    };
                }

                Some(ping) = ping_rx.recv() => {
                    if let Err(e) = write.send(ping).await {
                        break SessionEnd::Transport(format!("failed to send heartbeat: {e}"));
                    }
                }

                () = &mut handshake_deadline, if !self.handshake_completed => {
                    warn!(timeout = ?self.config.handshake_timeout, "no hello from gateway");
                    break SessionEnd::HandshakeTimeout;
                }

                received = timeout(receive_timeout, read.next()) => {
                    let frame = match received {
                        Err(_) => continue,
                        Ok(None) => break SessionEnd::ConnectionClosed,
                        Ok(Some(Err(e))) => break SessionEnd::Transport(e.to_string()),
                        Ok(Some(Ok(frame))) => frame,
                    };

                    let decoded = match frame {
                        Message::Text(text) => codec.decode_text(text.as_str()),
                        Message::Binary(bytes) => codec.decode_binary(&bytes),
                        Message::Close(frame) => {
                            debug!(?frame, "gateway sent close frame");
                            break SessionEnd::ConnectionClosed;
                        }
                        _ => continue,
                    };

                    match decoded {
                        Ok(signal) => {
                            if let Some(end) = self.dispatch(signal).await {
                                break end;
                            }
                        }
                        Err(e) => warn!(error = %e, "skipping undecodable frame"),
                    }
                }
            }
        };

        self.state.set_running(false);
        drop(ping_rx);
        heartbeat.shutdown().await;
        if let Err(e) = write.close().await {
            debug!(error = %e, "error closing gateway socket");
        }

        info!(reason = %end, "gateway session ended");
        SessionOutcome {
            end,
            handshake_completed: self.handshake_completed,
            resume: self.state.resume_state(),
        }
    }

    async fn dispatch(&mut self, signal: Signal) -> Option<SessionEnd> {
        trace!(kind = ?signal.kind, sequence = ?signal.sequence, "signal received");
        match signal.kind {
            SignalKind::Hello => self.on_hello(&signal),
            SignalKind::Event => {
                self.on_event(signal).await;
                None
            }
            SignalKind::Pong => {
                self.state.record_ack(Instant::now());
                None
            }
            SignalKind::Reconnect => {
                let data = signal.reconnect();
                warn!(code = data.code, err = %data.err, "gateway requested a fresh session");
                self.state.clear_session();
                Some(SessionEnd::ReconnectRequested { code: data.code })
            }
            SignalKind::ResumeAck => {
                match signal.resume_ack() {
                    Ok(ack) => {
                        self.state.set_session_id(ack.session_id);
                        self.complete_handshake();
                    }
                    Err(e) => warn!(error = %e, "malformed resume ack"),
                }
                None
            }
            SignalKind::Ping | SignalKind::Resume | SignalKind::Unknown(_) => {
                debug!(kind = ?signal.kind, "ignoring signal");
                None
            }
        }
    }

    fn on_hello(&mut self, signal: &Signal) -> Option<SessionEnd> {
        let hello = match signal.hello() {
            Ok(hello) => hello,
            Err(e) => {
                warn!(error = %e, "malformed hello");
                return None;
            }
        };

        if hello.is_success() {
            if let Some(session_id) = hello.session_id {
                self.state.set_session_id(session_id);
            }
            self.complete_handshake();
            return None;
        }

        if hello.is_credential_error() {
            error!(code = hello.code, "gateway rejected the bot token");
            return Some(SessionEnd::CredentialRejected { code: hello.code });
        }

        warn!(code = hello.code, "gateway handshake failed");
        Some(SessionEnd::HandshakeFailed { code: hello.code })
    }

    fn complete_handshake(&mut self) {
        let session_id = self.state.session_id();
        if self.handshake_completed {
            debug!(session_id = ?session_id, "handshake confirmed again");
            return;
        }
        self.handshake_completed = true;
        info!(
            session_id = ?session_id,
            resumed = self.resuming,
            last_sequence = self.state.last_sequence(),
            "gateway session established"
        );
        self.reporter.connected(session_id, self.resuming);
    }

    async fn on_event(&self, signal: Signal) {
        let sequence = signal.sequence;
        if let Some(sn) = sequence {
            if self.state.is_stale(sn) {
                debug!(sn, last = self.state.last_sequence(), "discarding stale event");
                return;
            }
        }

        let delivery = self.consumer.on_event(InboundEvent {
            sequence,
            payload: signal.payload,
        });
        let delivered = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                debug!(sequence = ?sequence, "session stopping, event delivery abandoned");
                return;
            }
            delivered = AssertUnwindSafe(delivery).catch_unwind() => delivered,
        };
        match delivered {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, sequence = ?sequence, "event consumer failed"),
            Err(_) => error!(sequence = ?sequence, "event consumer panicked"),
        }

        if let Some(sn) = sequence {
            self.state.advance_sequence(sn);
        }
    }

    fn finish_early(self, end: SessionEnd) -> SessionOutcome {
        warn!(reason = %end, "gateway session did not start");
        SessionOutcome::not_started(end, self.state.resume_state())
    }
}
