//! Periodic forced reconnect.
//!
//! Long-lived gateway sessions are recycled on a fixed period; the supervisor
//! sees an ordinary disconnect and reconnects with resume.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::supervisor::SupervisorHandle;

/// Background task that recycles the live session every `period`.
#[derive(Debug)]
pub struct SessionRecycler {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl SessionRecycler {
    /// Start recycling sessions owned by `supervisor`.
    pub fn spawn(period: Duration, supervisor: SupervisorHandle) -> Self {
        let stop = supervisor.shutdown_token().child_token();
        let task = tokio::spawn(run_recycler(period, supervisor, stop.clone()));
        Self { stop, task }
    }

    /// Stop the task and wait for it to exit.
    pub async fn shutdown(self) {
        self.stop.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "session recycler ended abnormally");
        }
    }
}

async fn run_recycler(period: Duration, supervisor: SupervisorHandle, stop: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = stop.cancelled() => break,
            _ = ticker.tick() => {
                if supervisor.recycle_session() {
                    info!(?period, "recycling gateway session");
                } else {
                    debug!("no live session to recycle");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_recycles_live_session_each_period() {
        let handle = SupervisorHandle::new();
        let recycler = SessionRecycler::spawn(Duration::from_secs(3600), handle.clone());

        let first = handle.install_session();
        tokio::time::sleep(Duration::from_secs(3599)).await;
        assert!(!first.is_cancelled());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(first.is_cancelled());

        let second = handle.install_session();
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(second.is_cancelled());

        recycler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_with_supervisor_shutdown() {
        let handle = SupervisorHandle::new();
        let recycler = SessionRecycler::spawn(Duration::from_secs(60), handle.clone());

        handle.stop();
        tokio::time::timeout(Duration::from_secs(1), recycler.shutdown())
            .await
            .expect("recycler exits promptly");
    }
}
