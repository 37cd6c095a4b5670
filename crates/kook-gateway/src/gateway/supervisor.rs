//! Reconnect supervisor.
//!
//! Drives the outer retry loop: resolve an endpoint, run a session to
//! completion, classify the attempt, then either reconnect (the handshake had
//! completed, or a recycle interrupted the attempt), back off (ordinary
//! failure) or stop for good (credential rejected, or too many consecutive
//! failures).
//!
//! Attempts that complete a handshake start at least `initial_delay` apart,
//! so a gateway that accepts and then drops every session cannot drive a
//! tight lookup loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::consumer::EventConsumer;
use super::events::{StatusReporter, SupervisorEvent};
use super::reconnect::{Backoff, ReconnectConfig};
use super::recycler::SessionRecycler;
use super::session::{AttemptClass, GatewaySession, SessionConfig, SessionEnd, SessionOutcome};
use super::state::{ConnectionState, ResumeState};
use crate::api::KookApi;
use crate::error::GatewayError;

/// Default period of the forced session recycle.
pub const DEFAULT_RECYCLE_INTERVAL: Duration = Duration::from_secs(3600);

/// Cloneable control handle for a running supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    shutdown: CancellationToken,
    current: Arc<Mutex<Option<CancellationToken>>>,
}

impl SupervisorHandle {
    pub(crate) fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Stop the supervisor and the live session.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Whether a stop was requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// End the live session; the supervisor reconnects as after any
    /// ordinary disconnect. Returns false when no session is live.
    pub fn recycle_session(&self) -> bool {
        match self.current.lock().as_ref() {
            Some(session) if !session.is_cancelled() => {
                session.cancel();
                true
            }
            _ => false,
        }
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub(crate) fn install_session(&self) -> CancellationToken {
        let session = self.shutdown.child_token();
        *self.current.lock() = Some(session.clone());
        session
    }

    fn clear_session(&self) {
        *self.current.lock() = None;
    }
}

/// Keeps one gateway session alive at a time.
pub struct ReconnectSupervisor<C> {
    api: KookApi,
    consumer: Arc<C>,
    session_config: SessionConfig,
    reconnect_config: ReconnectConfig,
    recycle_interval: Option<Duration>,
    handle: SupervisorHandle,
    reporter: StatusReporter,
}

impl<C: EventConsumer> ReconnectSupervisor<C> {
    /// Create a supervisor with default settings.
    #[must_use]
    pub fn new(api: KookApi, consumer: C) -> Self {
        Self {
            api,
            consumer: Arc::new(consumer),
            session_config: SessionConfig::default(),
            reconnect_config: ReconnectConfig::default(),
            recycle_interval: Some(DEFAULT_RECYCLE_INTERVAL),
            handle: SupervisorHandle::new(),
            reporter: StatusReporter::default(),
        }
    }

    /// Configure each session.
    #[must_use]
    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Configure backoff and the failure ceiling.
    #[must_use]
    pub fn with_reconnect_config(mut self, config: ReconnectConfig) -> Self {
        self.reconnect_config = config;
        self
    }

    /// Set or disable the forced session recycle.
    #[must_use]
    pub fn with_recycle_interval(mut self, interval: Option<Duration>) -> Self {
        self.recycle_interval = interval;
        self
    }

    /// Publish lifecycle events on `events`.
    #[must_use]
    pub fn with_events(mut self, events: mpsc::Sender<SupervisorEvent>) -> Self {
        self.reporter = StatusReporter::new(Some(events));
        self
    }

    /// Control handle, usable from other tasks.
    #[must_use]
    pub fn handle(&self) -> SupervisorHandle {
        self.handle.clone()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.reporter.state()
    }

    /// Run until stopped.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::CredentialRejected`] when the gateway rejects
    /// the token, or [`GatewayError::RetriesExhausted`] after too many
    /// consecutive failed attempts. A requested stop returns `Ok`.
    pub async fn run(&self) -> Result<(), GatewayError> {
        let recycler = self
            .recycle_interval
            .map(|period| SessionRecycler::spawn(period, self.handle.clone()));

        let result = self
            .run_attempts(|resume, session| self.attempt(resume, session))
            .await;

        if let Some(recycler) = recycler {
            recycler.shutdown().await;
        }
        result
    }

    async fn attempt(&self, resume: ResumeState, session: CancellationToken) -> SessionOutcome {
        self.reporter.set_state(ConnectionState::Connecting);

        let lookup = self
            .api
            .resolve_gateway(self.session_config.compression, &resume);
        let endpoint = tokio::select! {
            () = session.cancelled() => {
                return SessionOutcome::not_started(SessionEnd::Closed, resume);
            }
            endpoint = lookup => endpoint,
        };
        let endpoint = match endpoint {
            Ok(endpoint) => {
                info!(resume = endpoint.resume, "gateway endpoint resolved");
                endpoint
            }
            Err(GatewayError::Locator(reason)) => {
                return SessionOutcome::not_started(SessionEnd::LocatorFailed(reason), resume);
            }
            Err(e) => {
                return SessionOutcome::not_started(SessionEnd::LocatorFailed(e.to_string()), resume);
            }
        };

        GatewaySession::new(
            self.session_config.clone(),
            &resume,
            Arc::clone(&self.consumer),
            session,
        )
        .with_reporter(self.reporter.clone())
        .run(&endpoint.url)
        .await
    }

    pub(crate) async fn run_attempts<F, Fut>(&self, mut attempt: F) -> Result<(), GatewayError>
    where
        F: FnMut(ResumeState, CancellationToken) -> Fut,
        Fut: Future<Output = SessionOutcome>,
    {
        let shutdown = self.handle.shutdown_token();
        let mut backoff = Backoff::new(self.reconnect_config.clone());
        let mut resume = ResumeState::default();
        let mut failures: u32 = 0;

        while !shutdown.is_cancelled() {
            let session = self.handle.install_session();
            let started = Instant::now();
            let outcome = attempt(resume.clone(), session).await;
            self.handle.clear_session();

            let class = outcome.classify();
            let reason = outcome.end.to_string();
            resume = outcome.resume;

            match class {
                AttemptClass::Fatal { code } => {
                    error!(code, "gateway rejected the bot token; re-authenticate with a new token");
                    self.reporter.credential_rejected(code);
                    return Err(GatewayError::CredentialRejected { code });
                }
                AttemptClass::Success => {
                    backoff.reset();
                    failures = 0;
                    if shutdown.is_cancelled() {
                        break;
                    }
                    info!(
                        reason = %reason,
                        resume = resume.can_resume(),
                        "gateway session ended, reconnecting"
                    );
                    self.reporter.disconnected(reason);

                    let floor = self.reconnect_config.initial_delay;
                    let lived = started.elapsed();
                    if lived < floor {
                        debug!(lived = ?lived, "short-lived session, spacing out the reconnect");
                        tokio::select! {
                            () = shutdown.cancelled() => break,
                            () = sleep(floor - lived) => {}
                        }
                    }
                }
                AttemptClass::Interrupted => {
                    if shutdown.is_cancelled() {
                        break;
                    }
                    debug!(reason = %reason, "attempt recycled before the handshake, reconnecting");
                }
                AttemptClass::Failure => {
                    if shutdown.is_cancelled() {
                        break;
                    }
                    failures += 1;
                    let delay = backoff.next_delay();
                    warn!(
                        attempt = failures,
                        delay = ?delay,
                        reason = %reason,
                        "gateway attempt failed, backing off"
                    );
                    self.reporter.disconnected(reason.clone());
                    self.reporter.reconnecting(failures, delay);

                    tokio::select! {
                        () = shutdown.cancelled() => break,
                        () = sleep(delay) => {}
                    }

                    if !self.reconnect_config.should_reconnect(failures) {
                        error!(attempts = failures, last_error = %reason, "giving up on the gateway");
                        self.reporter.reconnect_failed(failures, reason.clone());
                        return Err(GatewayError::RetriesExhausted {
                            attempts: failures,
                            last_error: reason,
                        });
                    }
                }
            }
        }

        info!("gateway supervisor stopped");
        self.reporter.set_state(ConnectionState::Disconnected);
        Ok(())
    }
}
