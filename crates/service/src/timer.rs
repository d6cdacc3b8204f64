//! Round countdown timer.
//!
//! Each arm cycle spawns one sleep task that injects a `TimerElapsed`
//! command into the auction's own queue. Expiry therefore contends with
//! bids on equal footing: whichever is dequeued first wins, and a bid that
//! lands before the expiry message re-arms with a fresh epoch, turning the
//! old expiry into a no-op even if its task could not be aborted in time.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use pavilion_types::Millis;

use crate::actor::ActorMessage;

pub(crate) struct RoundTimer {
    tx: mpsc::Sender<ActorMessage>,
    pending: Option<JoinHandle<()>>,
}

impl RoundTimer {
    pub(crate) fn new(tx: mpsc::Sender<ActorMessage>) -> Self {
        Self { tx, pending: None }
    }

    /// Start a countdown for the given epoch, replacing any pending one.
    pub(crate) fn arm(&mut self, window_ms: Millis, epoch: u64) {
        self.cancel();
        let tx = self.tx.clone();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(window_ms)).await;
            trace!(epoch, "round timer expired");
            // The writer may already be gone during shutdown.
            let _ = tx.send(ActorMessage::TimerElapsed { epoch }).await;
        }));
    }

    /// Abort the pending countdown, if any. Best effort: an expiry already
    /// queued stays queued and dies on its stale epoch.
    pub(crate) fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

impl Drop for RoundTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_arm_delivers_expiry_after_window() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut timer = RoundTimer::new(tx);
        timer.arm(30_000, 1);

        tokio::time::sleep(Duration::from_millis(30_001)).await;
        match rx.try_recv() {
            Ok(ActorMessage::TimerElapsed { epoch }) => assert_eq!(epoch, 1),
            other => panic!("expected expiry, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_pending_countdown() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut timer = RoundTimer::new(tx);
        timer.arm(30_000, 1);

        tokio::time::sleep(Duration::from_millis(20_000)).await;
        timer.arm(30_000, 2);

        // Only the second epoch ever fires.
        tokio::time::sleep(Duration::from_millis(40_000)).await;
        match rx.try_recv() {
            Ok(ActorMessage::TimerElapsed { epoch }) => assert_eq!(epoch, 2),
            other => panic!("expected expiry, got {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_suppresses_expiry() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut timer = RoundTimer::new(tx);
        timer.arm(30_000, 1);
        tokio::time::sleep(Duration::from_millis(10_000)).await;
        timer.cancel();

        tokio::time::sleep(Duration::from_millis(60_000)).await;
        assert!(rx.try_recv().is_err());
    }
}
