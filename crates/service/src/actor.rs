//! Per-auction writer task.
//!
//! Every live auction is owned by exactly one task holding its
//! [`AuctionState`]. Admin commands, team bids and timer expiries all enter
//! through one mpsc queue and are applied strictly in arrival order, which
//! is the entire concurrency story: no locks around state, no
//! compare-and-swap, no stale reads.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{info, warn};

use pavilion_engine::{apply, build_view, AuctionCommand, AuctionError, AuctionState, TimerDirective};
use pavilion_types::view::AuctionView;
use pavilion_types::{AuctionId, Millis};

use crate::hub::BroadcastHub;
use crate::persist::PersistLane;
use crate::timer::RoundTimer;
use crate::{now_ms, ServiceError};

const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Millisecond clock anchored to the wall once at writer start and advanced
/// by the tokio clock from then on. Round timing therefore follows virtual
/// time under a paused-clock test runtime.
struct WallClock {
    base_ms: Millis,
    origin: Instant,
}

impl WallClock {
    fn start() -> Self {
        Self {
            base_ms: now_ms(),
            origin: Instant::now(),
        }
    }

    fn now_ms(&self) -> Millis {
        self.base_ms + self.origin.elapsed().as_millis() as Millis
    }
}

/// Reply to a successfully applied command.
#[derive(Clone, Debug)]
pub struct CommandReply {
    /// Human-readable outcome, e.g. "player 10 sold to team 2 for 550000".
    pub description: Option<String>,
    /// Snapshot after the command, whether or not it changed state.
    pub view: Arc<AuctionView>,
}

pub(crate) enum ActorMessage {
    Command {
        command: AuctionCommand,
        reply: oneshot::Sender<Result<CommandReply, AuctionError>>,
    },
    TimerElapsed {
        epoch: u64,
    },
}

impl fmt::Debug for ActorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command { command, .. } => f
                .debug_struct("Command")
                .field("command", command)
                .finish_non_exhaustive(),
            Self::TimerElapsed { epoch } => {
                f.debug_struct("TimerElapsed").field("epoch", epoch).finish()
            }
        }
    }
}

/// Cheap cloneable handle to one auction's writer.
#[derive(Clone)]
pub struct AuctionHandle {
    auction_id: AuctionId,
    tx: mpsc::Sender<ActorMessage>,
    hub: Arc<BroadcastHub>,
}

impl AuctionHandle {
    pub fn auction_id(&self) -> AuctionId {
        self.auction_id
    }

    /// Submit a command and wait for the writer's verdict.
    pub async fn execute(&self, command: AuctionCommand) -> Result<CommandReply, ServiceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ActorMessage::Command {
                command,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ServiceError::AuctionStopped(self.auction_id))?;
        reply_rx
            .await
            .map_err(|_| ServiceError::AuctionStopped(self.auction_id))?
            .map_err(ServiceError::Auction)
    }

    /// Latest committed snapshot without touching the writer queue.
    pub fn snapshot(&self) -> Option<Arc<AuctionView>> {
        self.hub.latest()
    }

    pub fn subscribe(&self) -> crate::hub::Subscription {
        self.hub.subscribe()
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }
}

/// Spawn the writer task for a configured auction and return its handle.
pub fn spawn_auction(state: AuctionState, persist: PersistLane) -> AuctionHandle {
    let auction_id = state.config.auction_id;
    let hub = Arc::new(BroadcastHub::new(auction_id));
    let (tx, rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);

    // Late joiners need a snapshot before the first commit.
    hub.publish_state(Arc::new(build_view(&state)));

    let timer = RoundTimer::new(tx.clone());
    tokio::spawn(run(state, rx, hub.clone(), persist, timer));

    AuctionHandle {
        auction_id,
        tx,
        hub,
    }
}

async fn run(
    mut state: AuctionState,
    mut rx: mpsc::Receiver<ActorMessage>,
    hub: Arc<BroadcastHub>,
    persist: PersistLane,
    mut timer: RoundTimer,
) {
    let auction_id = state.config.auction_id;
    let clock = WallClock::start();
    info!(auction_id, "auction writer started");

    while let Some(message) = rx.recv().await {
        match message {
            ActorMessage::Command { command, reply } => {
                let name = command.name();
                let result = apply(&mut state, clock.now_ms(), command);
                let result = match result {
                    Ok(committed) => {
                        let view =
                            commit_effects(&state, &hub, &persist, &mut timer, &clock, &committed);
                        Ok(CommandReply {
                            description: committed.description,
                            view,
                        })
                    }
                    Err(err) => {
                        warn!(auction_id, command = name, %err, "command rejected");
                        Err(err)
                    }
                };
                // The caller may have given up waiting; that is their business.
                let _ = reply.send(result);
            }
            ActorMessage::TimerElapsed { epoch } => {
                match apply(&mut state, clock.now_ms(), AuctionCommand::TimerElapsed { epoch }) {
                    Ok(committed) => {
                        commit_effects(&state, &hub, &persist, &mut timer, &clock, &committed);
                    }
                    Err(err) => warn!(auction_id, epoch, %err, "timer expiry rejected"),
                }
            }
        }
    }

    info!(auction_id, "auction writer stopped");
}

/// Apply the side effects of a committed command and return the snapshot.
fn commit_effects(
    state: &AuctionState,
    hub: &BroadcastHub,
    persist: &PersistLane,
    timer: &mut RoundTimer,
    clock: &WallClock,
    committed: &pavilion_engine::Committed,
) -> Arc<AuctionView> {
    match committed.timer {
        TimerDirective::Arm { window_ms, epoch } => timer.arm(window_ms, epoch),
        TimerDirective::Cancel => timer.cancel(),
        TimerDirective::Leave => {}
    }

    let view = Arc::new(build_view(state));
    if committed.broadcast {
        hub.publish_state(view.clone());
        persist.offer(view.clone());
    }
    if let Some(message) = &committed.announcement {
        hub.publish_announcement(message.clone(), clock.now_ms());
    }
    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use pavilion_types::{
        AuctionConfig, AuctionSetup, AuctionStatus, IncrementSchedule, PlayerPoolEntry,
        PlayerStatus, ResumePolicy, TeamState,
    };
    use std::time::Duration;
    use tokio::time::timeout;

    fn handle() -> AuctionHandle {
        handle_with(ResumePolicy::default())
    }

    fn handle_with(resume_policy: ResumePolicy) -> AuctionHandle {
        let setup = AuctionSetup {
            config: AuctionConfig {
                auction_id: 1,
                name: "test".into(),
                base_price: 500_000,
                squad_min: 1,
                squad_max: 5,
                increments: IncrementSchedule::preset("standard").unwrap(),
                bid_window_ms: 30_000,
                resume_policy,
            },
            teams: vec![
                TeamState::new(1, "Strikers", 10_000_000, vec![]).unwrap(),
                TeamState::new(2, "Royals", 10_000_000, vec![]).unwrap(),
            ],
            pool: vec![
                PlayerPoolEntry::queued(10, "Opener"),
                PlayerPoolEntry::queued(11, "Keeper"),
            ],
        };
        let state = AuctionState::from_setup(setup).unwrap();
        spawn_auction(state, PersistLane::disabled())
    }

    #[tokio::test]
    async fn test_initial_snapshot_available_before_first_command() {
        let handle = handle();
        let view = handle.snapshot().unwrap();
        assert_eq!(view.status, AuctionStatus::Configured);
        assert_eq!(view.version, 0);
    }

    #[tokio::test]
    async fn test_rejected_command_reaches_caller() {
        let handle = handle();
        let err = handle
            .execute(AuctionCommand::Bid {
                team_id: 1,
                amount: 500_000,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Auction(AuctionError::InvalidTransition { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_resolves_on_timer_expiry() {
        let handle = handle();
        handle.execute(AuctionCommand::Start).await.unwrap();
        handle.execute(AuctionCommand::NextPlayer).await.unwrap();
        handle
            .execute(AuctionCommand::Bid {
                team_id: 2,
                amount: 500_000,
            })
            .await
            .unwrap();

        let mut sub = handle.subscribe();
        // Let the 30s window elapse on the paused clock.
        tokio::time::sleep(Duration::from_millis(31_000)).await;

        let sold = timeout(Duration::from_secs(5), async {
            loop {
                let view = sub.next_state().await.expect("stream open");
                if view.stats.sold == 1 {
                    return view;
                }
            }
        })
        .await
        .expect("round should resolve");

        assert!(sold.bidding.is_none());
        let royals = sold.teams.iter().find(|t| t.team_id == 2).unwrap();
        assert_eq!(royals.purse_remaining, 10_000_000 - 500_000);
        assert_eq!(royals.squad_size, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bid_resets_countdown() {
        let handle = handle();
        handle.execute(AuctionCommand::Start).await.unwrap();
        handle.execute(AuctionCommand::NextPlayer).await.unwrap();

        // Bid at 29s; expiry from round open must not resolve the round.
        tokio::time::sleep(Duration::from_millis(29_000)).await;
        handle
            .execute(AuctionCommand::Bid {
                team_id: 1,
                amount: 500_000,
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2_000)).await;

        let view = handle.snapshot().unwrap();
        let bidding = view.bidding.as_ref().expect("round still open");
        assert_eq!(bidding.current_bid, Some(500_000));

        // The re-armed window runs out 30s after the bid.
        tokio::time::sleep(Duration::from_millis(29_000)).await;
        tokio::task::yield_now().await;
        let mut sub = handle.subscribe();
        let resolved = timeout(Duration::from_secs(5), async {
            loop {
                let view = sub.next_state().await.expect("stream open");
                if view.bidding.is_none() {
                    return view;
                }
            }
        })
        .await
        .expect("round should resolve after re-armed window");
        assert_eq!(resolved.stats.sold, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_freezes_countdown() {
        let handle = handle();
        handle.execute(AuctionCommand::Start).await.unwrap();
        handle.execute(AuctionCommand::NextPlayer).await.unwrap();
        handle
            .execute(AuctionCommand::Pause { reason: None })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(120_000)).await;
        let view = handle.snapshot().unwrap();
        assert_eq!(view.status, AuctionStatus::Paused);
        assert!(view.bidding.is_some());

        // Resume re-arms; the round then resolves normally.
        handle.execute(AuctionCommand::Resume).await.unwrap();
        tokio::time::sleep(Duration::from_millis(31_000)).await;
        tokio::task::yield_now().await;
        let mut sub = handle.subscribe();
        let resolved = timeout(Duration::from_secs(5), async {
            loop {
                let view = sub.next_state().await.expect("stream open");
                if view.bidding.is_none() {
                    return view;
                }
            }
        })
        .await
        .expect("round should resolve after resume");
        assert_eq!(resolved.stats.unsold, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_remaining_policy_keeps_leftover_window() {
        let handle = handle_with(ResumePolicy::ResumeRemaining);
        handle.execute(AuctionCommand::Start).await.unwrap();
        handle.execute(AuctionCommand::NextPlayer).await.unwrap();

        // Pause 10s into the 30s window; 20s is banked.
        tokio::time::sleep(Duration::from_millis(10_000)).await;
        handle
            .execute(AuctionCommand::Pause { reason: None })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100_000)).await;
        handle.execute(AuctionCommand::Resume).await.unwrap();

        // The round survives 19s after resume, not just the stub of the
        // original window.
        tokio::time::sleep(Duration::from_millis(19_000)).await;
        let view = handle.snapshot().unwrap();
        assert_eq!(view.status, AuctionStatus::Live);
        assert!(view.bidding.is_some());

        // It expires once the banked 20s run out.
        tokio::time::sleep(Duration::from_millis(2_000)).await;
        tokio::task::yield_now().await;
        let mut sub = handle.subscribe();
        let resolved = timeout(Duration::from_secs(5), async {
            loop {
                let view = sub.next_state().await.expect("stream open");
                if view.bidding.is_none() {
                    return view;
                }
            }
        })
        .await
        .expect("round should resolve after the leftover window");
        assert_eq!(resolved.stats.unsold, 1);
    }

    #[tokio::test]
    async fn test_announcement_fans_out() {
        let handle = handle();
        let mut sub = handle.subscribe();
        handle
            .execute(AuctionCommand::Announce {
                message: "last player of the day".into(),
            })
            .await
            .unwrap();

        let a = timeout(Duration::from_secs(5), sub.next_announcement())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.message, "last player of the day");
    }

    #[tokio::test]
    async fn test_skip_then_next_moves_through_pool() {
        let handle = handle();
        handle.execute(AuctionCommand::Start).await.unwrap();
        handle.execute(AuctionCommand::NextPlayer).await.unwrap();
        handle.execute(AuctionCommand::Skip).await.unwrap();
        let reply = handle.execute(AuctionCommand::NextPlayer).await.unwrap();

        let bidding = reply.view.bidding.as_ref().expect("second round open");
        assert_eq!(bidding.player.player_id, 11);
        assert_eq!(bidding.player.status, PlayerStatus::InBidding);
        assert_eq!(reply.view.stats.unsold, 1);
    }
}
