//! Broadcast fan-out.
//!
//! One hub per auction. State snapshots and admin announcements go out on
//! separate channels so text messages never force a full state re-render on
//! clients. Slow subscribers are never allowed to block the writer: the
//! channels are lossy, and a lagging subscriber simply jumps forward to a
//! newer snapshot.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::trace;

use pavilion_types::view::{Announcement, AuctionView};
use pavilion_types::{AuctionId, Millis};

const STATE_CHANNEL_CAPACITY: usize = 64;
const ANNOUNCE_CHANNEL_CAPACITY: usize = 32;

/// Per-auction broadcast hub.
pub struct BroadcastHub {
    auction_id: AuctionId,
    state_tx: broadcast::Sender<Arc<AuctionView>>,
    announce_tx: broadcast::Sender<Announcement>,
    latest: RwLock<Option<Arc<AuctionView>>>,
}

impl BroadcastHub {
    pub fn new(auction_id: AuctionId) -> Self {
        let (state_tx, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        let (announce_tx, _) = broadcast::channel(ANNOUNCE_CHANNEL_CAPACITY);
        Self {
            auction_id,
            state_tx,
            announce_tx,
            latest: RwLock::new(None),
        }
    }

    /// Publish a committed snapshot. Send errors mean no subscribers are
    /// connected, which is fine; the snapshot is still retained for late
    /// joiners.
    pub fn publish_state(&self, view: Arc<AuctionView>) {
        *self.latest.write() = Some(view.clone());
        let receivers = self.state_tx.send(view).unwrap_or(0);
        trace!(auction_id = self.auction_id, receivers, "state published");
    }

    /// Publish an admin announcement.
    pub fn publish_announcement(&self, message: String, timestamp_ms: Millis) {
        let _ = self.announce_tx.send(Announcement {
            auction_id: self.auction_id,
            message,
            timestamp_ms,
        });
    }

    /// Most recent committed snapshot, if any commit has happened yet.
    pub fn latest(&self) -> Option<Arc<AuctionView>> {
        self.latest.read().clone()
    }

    /// Subscribe to state and announcement streams. The subscription starts
    /// with the latest snapshot already delivered, so a client joining
    /// mid-auction renders current state immediately.
    ///
    /// The receivers are created before the snapshot is read: a commit
    /// landing in between arrives over the channel, and the version check
    /// in [`Subscription::next_state`] drops it if it was already the
    /// initial snapshot. No gap, no duplicate.
    pub fn subscribe(&self) -> Subscription {
        let state_rx = self.state_tx.subscribe();
        let announce_rx = self.announce_tx.subscribe();
        Subscription {
            initial: self.latest(),
            last_version: 0,
            state_rx,
            announce_rx,
        }
    }
}

/// A client's view of the broadcast streams.
pub struct Subscription {
    initial: Option<Arc<AuctionView>>,
    last_version: u64,
    state_rx: broadcast::Receiver<Arc<AuctionView>>,
    announce_rx: broadcast::Receiver<Announcement>,
}

impl Subscription {
    /// Next state snapshot, in version order.
    ///
    /// The first call yields the snapshot that was current at subscribe
    /// time. Lag on the underlying channel is absorbed by skipping straight
    /// to the newest available snapshot; versions never go backwards.
    /// Returns `None` once the auction task is gone and the backlog drained.
    pub async fn next_state(&mut self) -> Option<Arc<AuctionView>> {
        if let Some(view) = self.initial.take() {
            self.last_version = view.version;
            return Some(view);
        }
        loop {
            match self.state_rx.recv().await {
                Ok(view) => {
                    if view.version <= self.last_version {
                        continue;
                    }
                    self.last_version = view.version;
                    return Some(view);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    trace!(skipped, "subscriber lagged, catching up");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next admin announcement.
    pub async fn next_announcement(&mut self) -> Option<Announcement> {
        loop {
            match self.announce_rx.recv().await {
                Ok(announcement) => return Some(announcement),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pavilion_types::view::AuctionStats;
    use pavilion_types::AuctionStatus;

    fn view(version: u64) -> Arc<AuctionView> {
        Arc::new(AuctionView {
            auction_id: 1,
            status: AuctionStatus::Live,
            version,
            current_round: None,
            teams: vec![],
            bidding: None,
            stats: AuctionStats::default(),
        })
    }

    #[tokio::test]
    async fn test_late_joiner_gets_latest_snapshot_first() {
        let hub = BroadcastHub::new(1);
        hub.publish_state(view(1));
        hub.publish_state(view(2));

        let mut sub = hub.subscribe();
        let first = sub.next_state().await.unwrap();
        assert_eq!(first.version, 2);
    }

    #[tokio::test]
    async fn test_versions_are_monotonic_for_subscribers() {
        let hub = BroadcastHub::new(1);
        hub.publish_state(view(5));
        let mut sub = hub.subscribe();

        // The initial snapshot (v5) races with the same view arriving over
        // the channel; the duplicate must be suppressed.
        hub.publish_state(view(6));
        assert_eq!(sub.next_state().await.unwrap().version, 5);
        assert_eq!(sub.next_state().await.unwrap().version, 6);
    }

    #[tokio::test]
    async fn test_announcements_flow_independently() {
        let hub = BroadcastHub::new(1);
        let mut sub = hub.subscribe();
        hub.publish_announcement("tea break".into(), 1_000);

        let a = sub.next_announcement().await.unwrap();
        assert_eq!(a.message, "tea break");
        assert_eq!(a.timestamp_ms, 1_000);
        assert_eq!(a.auction_id, 1);
    }

    #[tokio::test]
    async fn test_no_subscribers_is_not_an_error() {
        let hub = BroadcastHub::new(1);
        hub.publish_state(view(1));
        hub.publish_announcement("hello".into(), 0);
        assert_eq!(hub.latest().unwrap().version, 1);
    }
}
