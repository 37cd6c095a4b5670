//! Heartbeat monitor.
//!
//! Sends `{"s":2,"sn":<last_sequence>}` every `interval ± jitter` regardless
//! of traffic, then waits up to `ack_timeout` for a pong newer than the ping.
//! After `max_missed_acks` consecutive misses the monitor marks itself dead
//! and cancels the session token; the receive loop notices and ends the
//! session. The monitor never touches the socket directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kook_proto::encode_ping;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::state::SessionState;

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Base interval between pings.
    pub interval: Duration,
    /// Symmetric random jitter around the interval.
    pub jitter: Duration,
    /// Timeout for waiting on a pong.
    pub ack_timeout: Duration,
    /// Number of consecutive missed pongs before the connection is dead.
    pub max_missed_acks: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            jitter: Duration::from_secs(5),
            ack_timeout: Duration::from_secs(6),
            max_missed_acks: 3,
        }
    }
}

impl HeartbeatConfig {
    /// Pick the next wake-up delay, uniform in `interval ± jitter`.
    #[must_use]
    pub fn next_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.interval;
        }
        let low = self.interval.saturating_sub(self.jitter);
        let high = self.interval + self.jitter;
        rand::thread_rng().gen_range(low..=high)
    }
}

/// Handle to a running heartbeat monitor.
///
/// Dropping the handle stops the monitor.
#[derive(Debug)]
pub struct HeartbeatHandle {
    stop: CancellationToken,
    dead: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl HeartbeatHandle {
    /// Whether the monitor gave up on the connection.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    /// Stop the monitor and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.stop.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "heartbeat task ended abnormally");
            }
        }
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

/// Start the heartbeat monitor for one session.
///
/// Pings are queued on `tx` for the receive loop to write. `session` is
/// cancelled when the connection is declared dead.
pub fn start_heartbeat_task(
    state: Arc<SessionState>,
    tx: mpsc::Sender<Message>,
    config: HeartbeatConfig,
    session: CancellationToken,
) -> HeartbeatHandle {
    let stop = session.child_token();
    let dead = Arc::new(AtomicBool::new(false));

    let task = tokio::spawn(run_monitor(
        state,
        tx,
        config,
        session,
        stop.clone(),
        Arc::clone(&dead),
    ));

    HeartbeatHandle {
        stop,
        dead,
        task: Some(task),
    }
}

async fn run_monitor(
    state: Arc<SessionState>,
    tx: mpsc::Sender<Message>,
    config: HeartbeatConfig,
    session: CancellationToken,
    stop: CancellationToken,
    dead: Arc<AtomicBool>,
) {
    let mut acks = state.subscribe_acks();

    loop {
        tokio::select! {
            () = stop.cancelled() => break,
            () = sleep(config.next_delay()) => {}
        }

        if !state.is_running() {
            debug!("session no longer running, heartbeat exiting");
            break;
        }

        let sequence = state.last_sequence();
        let sent_at = Instant::now();
        state.mark_ping_sent(sent_at);

        let queued = tokio::select! {
            () = stop.cancelled() => break,
            sent = tx.send(Message::text(encode_ping(sequence))) => sent.is_ok(),
        };
        if !queued {
            debug!("outbound channel closed, heartbeat exiting");
            break;
        }
        trace!(sequence, "heartbeat ping queued");

        let wait_ack = async {
            acks.wait_for(|at| matches!(*at, Some(t) if t >= sent_at))
                .await
                .is_ok()
        };
        let acked = tokio::select! {
            () = stop.cancelled() => break,
            result = timeout(config.ack_timeout, wait_ack) => matches!(result, Ok(true)),
        };

        if acked {
            state.reset_heartbeat_failures();
            continue;
        }

        let missed = state.record_heartbeat_miss();
        warn!(
            missed,
            max = config.max_missed_acks,
            "heartbeat ack not received in time"
        );
        if missed >= config.max_missed_acks {
            warn!("heartbeat declared the connection dead");
            dead.store(true, Ordering::SeqCst);
            session.cancel();
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::state::ResumeState;

    fn fast_config(max_missed_acks: u32) -> HeartbeatConfig {
        HeartbeatConfig {
            interval: Duration::from_secs(30),
            jitter: Duration::ZERO,
            ack_timeout: Duration::from_secs(6),
            max_missed_acks,
        }
    }

    fn running_state(last_sequence: u64) -> Arc<SessionState> {
        let state = Arc::new(SessionState::new(&ResumeState {
            session_id: Some("abc".to_string()),
            last_sequence,
        }));
        state.set_running(true);
        state
    }

    #[test]
    fn test_heartbeat_config_default() {
        let config = HeartbeatConfig::default();
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.jitter, Duration::from_secs(5));
        assert_eq!(config.ack_timeout, Duration::from_secs(6));
        assert_eq!(config.max_missed_acks, 3);
    }

    #[test]
    fn test_next_delay_within_jitter() {
        let config = HeartbeatConfig::default();
        for _ in 0..200 {
            let delay = config.next_delay();
            assert!(delay >= Duration::from_secs(25));
            assert!(delay <= Duration::from_secs(35));
        }
    }

    #[test]
    fn test_next_delay_without_jitter() {
        let config = fast_config(3);
        assert_eq!(config.next_delay(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_carries_last_sequence() {
        let state = running_state(17);
        let (tx, mut rx) = mpsc::channel(8);
        let session = CancellationToken::new();

        let handle = start_heartbeat_task(Arc::clone(&state), tx, fast_config(3), session);

        let ping = rx.recv().await.expect("ping");
        assert_eq!(ping, Message::text(r#"{"s":2,"sn":17}"#));
        assert!(state.last_ping_at().is_some());

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_missed_acks_declare_connection_dead() {
        let state = running_state(0);
        let (tx, mut rx) = mpsc::channel(8);
        let session = CancellationToken::new();

        let handle =
            start_heartbeat_task(Arc::clone(&state), tx, fast_config(3), session.clone());

        for _ in 0..3 {
            rx.recv().await.expect("ping");
        }
        session.cancelled().await;

        assert!(handle.is_dead());
        assert_eq!(state.heartbeat_failures(), 3);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_resets_failure_counter() {
        let state = running_state(0);
        let (tx, mut rx) = mpsc::channel(8);
        let session = CancellationToken::new();

        let handle =
            start_heartbeat_task(Arc::clone(&state), tx, fast_config(3), session.clone());

        // two misses
        rx.recv().await.expect("ping 1");
        rx.recv().await.expect("ping 2");
        // third ping is acknowledged, which must wipe the earlier misses
        rx.recv().await.expect("ping 3");
        assert_eq!(state.heartbeat_failures(), 2);
        state.record_ack(Instant::now());

        rx.recv().await.expect("ping 4");
        assert_eq!(state.heartbeat_failures(), 0);
        assert!(!session.is_cancelled());
        assert!(!handle.is_dead());

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_ack_does_not_count() {
        let state = running_state(0);
        state.record_ack(Instant::now());
        let (tx, mut rx) = mpsc::channel(8);
        let session = CancellationToken::new();

        let handle = start_heartbeat_task(Arc::clone(&state), tx, fast_config(1), session.clone());

        rx.recv().await.expect("ping");
        session.cancelled().await;
        assert!(handle.is_dead());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_session_not_running() {
        let state = running_state(0);
        state.set_running(false);
        let (tx, mut rx) = mpsc::channel(8);
        let session = CancellationToken::new();

        let handle = start_heartbeat_task(state, tx, fast_config(3), session.clone());

        assert!(rx.recv().await.is_none());
        assert!(!handle.is_dead());
        assert!(!session.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_before_first_ping() {
        let state = running_state(0);
        let (tx, mut rx) = mpsc::channel(8);
        let session = CancellationToken::new();

        let handle = start_heartbeat_task(state, tx, fast_config(3), session.clone());
        handle.shutdown().await;

        assert!(rx.recv().await.is_none());
        assert!(!session.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_monitor() {
        let state = running_state(0);
        let (tx, mut rx) = mpsc::channel(8);

        drop(start_heartbeat_task(
            state,
            tx,
            fast_config(3),
            CancellationToken::new(),
        ));

        assert!(rx.recv().await.is_none());
    }
}
