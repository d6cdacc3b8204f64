//! End-to-end integration tests for the live auction system.
//!
//! These tests exercise the full auction lifecycle through the async
//! service layer:
//! 1. Auction creation and registration
//! 2. Round-by-round bidding with timer resolution
//! 3. Admin corrections (skip, disqualify, undo)
//! 4. Pause/resume
//! 5. Completion and broadcast fan-out

#![cfg(test)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use pavilion_engine::{AuctionCommand, AuctionError};
use pavilion_service::{
    spawn_writer, AuctionRegistry, CreateAuctionSpec, MemoryStore, PersistenceAdapter,
    ServiceError,
};
use pavilion_types::view::AuctionView;
use pavilion_types::{
    AuctionConfig, AuctionSetup, AuctionStatus, IncrementSchedule, PlayerPoolEntry, PlayerStatus,
    ResumePolicy, TeamState,
};

const WINDOW_MS: u64 = 30_000;

const STRIKERS: u64 = 1;
const ROYALS: u64 = 2;

fn auction_spec(auction_id: u64) -> CreateAuctionSpec {
    CreateAuctionSpec {
        setup: AuctionSetup {
            config: AuctionConfig {
                auction_id,
                name: "Season 7 Mega Auction".into(),
                base_price: 500_000,
                squad_min: 1,
                squad_max: 4,
                increments: IncrementSchedule::preset("standard").unwrap(),
                bid_window_ms: WINDOW_MS,
                resume_policy: ResumePolicy::default(),
            },
            teams: vec![
                TeamState::new(STRIKERS, "Strikers", 20_000_000, vec![]).unwrap(),
                TeamState::new(ROYALS, "Royals", 20_000_000, vec![]).unwrap(),
            ],
            pool: vec![
                PlayerPoolEntry::queued(10, "Opener"),
                PlayerPoolEntry::queued(11, "Keeper"),
                PlayerPoolEntry::queued(12, "Spinner"),
            ],
        },
        admin_token: "admin-secret".into(),
        team_tokens: HashMap::from([
            (STRIKERS, "strikers-token".to_string()),
            (ROYALS, "royals-token".to_string()),
        ]),
    }
}

/// Wait until a broadcast snapshot satisfies the predicate.
async fn wait_for(
    sub: &mut pavilion_service::Subscription,
    mut pred: impl FnMut(&AuctionView) -> bool,
) -> Arc<AuctionView> {
    timeout(Duration::from_secs(10), async {
        loop {
            let view = sub.next_state().await.expect("broadcast stream closed");
            if pred(&view) {
                return view;
            }
        }
    })
    .await
    .expect("condition not reached in time")
}

/// The complete happy path: three players, two sold, one unsold.
#[tokio::test(start_paused = true)]
async fn test_full_auction_flow() {
    let store = Arc::new(MemoryStore::new());
    let registry = AuctionRegistry::new(spawn_writer(store.clone()));
    let handle = registry.create(auction_spec(1)).unwrap();
    let mut sub = handle.subscribe();

    // ========================================
    // Phase 1: Go live
    // ========================================

    handle.execute(AuctionCommand::Start).await.unwrap();
    let view = wait_for(&mut sub, |v| v.status == AuctionStatus::Live).await;
    assert!(view.bidding.is_none());

    // ========================================
    // Phase 2: Round 1, contested, sold
    // ========================================

    handle.execute(AuctionCommand::NextPlayer).await.unwrap();
    let (strikers_handle, strikers) = registry.authorize_team(1, "strikers-token").unwrap();
    let (royals_handle, royals) = registry.authorize_team(1, "royals-token").unwrap();
    assert_eq!(strikers, STRIKERS);
    assert_eq!(royals, ROYALS);

    strikers_handle
        .execute(AuctionCommand::Bid {
            team_id: strikers,
            amount: 500_000,
        })
        .await
        .unwrap();
    royals_handle
        .execute(AuctionCommand::Bid {
            team_id: royals,
            amount: 550_000,
        })
        .await
        .unwrap();

    // An off-step raise is rejected without touching the round.
    let err = strikers_handle
        .execute(AuctionCommand::Bid {
            team_id: strikers,
            amount: 560_000,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Auction(AuctionError::WrongIncrement { required: 600_000 })
    ));

    // Window runs out with the Royals leading.
    tokio::time::sleep(Duration::from_millis(WINDOW_MS + 1_000)).await;
    let view = wait_for(&mut sub, |v| v.stats.sold == 1).await;
    let royals_view = view.teams.iter().find(|t| t.team_id == ROYALS).unwrap();
    assert_eq!(royals_view.purse_remaining, 20_000_000 - 550_000);
    assert_eq!(royals_view.squad_size, 1);

    // ========================================
    // Phase 3: Round 2, no interest, skipped
    // ========================================

    handle.execute(AuctionCommand::NextPlayer).await.unwrap();
    handle.execute(AuctionCommand::Skip).await.unwrap();
    let view = wait_for(&mut sub, |v| v.stats.unsold == 1).await;
    assert!(view.bidding.is_none());

    // ========================================
    // Phase 4: Round 3, uncontested, sold on expiry
    // ========================================

    handle.execute(AuctionCommand::NextPlayer).await.unwrap();
    strikers_handle
        .execute(AuctionCommand::Bid {
            team_id: strikers,
            amount: 500_000,
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(WINDOW_MS + 1_000)).await;
    let view = wait_for(&mut sub, |v| v.stats.sold == 2).await;
    let strikers_view = view.teams.iter().find(|t| t.team_id == STRIKERS).unwrap();
    assert_eq!(strikers_view.purse_remaining, 20_000_000 - 500_000);

    // ========================================
    // Phase 5: Pool exhausted, auction completes
    // ========================================

    handle.execute(AuctionCommand::NextPlayer).await.unwrap();
    let view = wait_for(&mut sub, |v| v.status == AuctionStatus::Completed).await;
    assert_eq!(view.stats.in_pool, 0);

    // The write-behind store converges on the final snapshot.
    tokio::time::sleep(Duration::from_secs(2)).await;
    let persisted = store.load_snapshot(1).await.unwrap().unwrap();
    assert_eq!(persisted.status, AuctionStatus::Completed);
    assert_eq!(persisted.version, view.version);
}

/// Undo walks back a sale and the player goes again.
#[tokio::test(start_paused = true)]
async fn test_undo_resells_player() {
    let registry = AuctionRegistry::new(pavilion_service::PersistLane::disabled());
    let handle = registry.create(auction_spec(1)).unwrap();
    let mut sub = handle.subscribe();

    handle.execute(AuctionCommand::Start).await.unwrap();
    handle.execute(AuctionCommand::NextPlayer).await.unwrap();
    handle
        .execute(AuctionCommand::Bid {
            team_id: STRIKERS,
            amount: 500_000,
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(WINDOW_MS + 1_000)).await;
    wait_for(&mut sub, |v| v.stats.sold == 1).await;

    // Admin catches a mistake and undoes the sale.
    let reply = handle.execute(AuctionCommand::Undo).await.unwrap();
    assert!(reply.description.unwrap().contains("sale of player 10"));
    let view = wait_for(&mut sub, |v| v.stats.sold == 0).await;
    let strikers = view.teams.iter().find(|t| t.team_id == STRIKERS).unwrap();
    assert_eq!(strikers.purse_remaining, 20_000_000);
    assert_eq!(strikers.squad_size, 0);

    // The player comes straight back under the hammer and sells again.
    handle.execute(AuctionCommand::NextPlayer).await.unwrap();
    let view = wait_for(&mut sub, |v| v.bidding.is_some()).await;
    assert_eq!(view.bidding.as_ref().unwrap().player.player_id, 10);

    handle
        .execute(AuctionCommand::Bid {
            team_id: ROYALS,
            amount: 500_000,
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(WINDOW_MS + 1_000)).await;
    let view = wait_for(&mut sub, |v| v.stats.sold == 1).await;
    let royals = view.teams.iter().find(|t| t.team_id == ROYALS).unwrap();
    assert_eq!(royals.squad_size, 1);
}

/// Pause freezes the clock; resume restarts the full window by default.
#[tokio::test(start_paused = true)]
async fn test_pause_resume_mid_round() {
    let registry = AuctionRegistry::new(pavilion_service::PersistLane::disabled());
    let handle = registry.create(auction_spec(1)).unwrap();
    let mut sub = handle.subscribe();

    handle.execute(AuctionCommand::Start).await.unwrap();
    handle.execute(AuctionCommand::NextPlayer).await.unwrap();
    handle
        .execute(AuctionCommand::Bid {
            team_id: ROYALS,
            amount: 500_000,
        })
        .await
        .unwrap();
    handle
        .execute(AuctionCommand::Pause {
            reason: Some("network outage at the venue".into()),
        })
        .await
        .unwrap();

    // Long dead air; the round survives untouched.
    tokio::time::sleep(Duration::from_millis(10 * WINDOW_MS)).await;
    let view = handle.snapshot().unwrap();
    assert_eq!(view.status, AuctionStatus::Paused);
    assert_eq!(view.bidding.as_ref().unwrap().current_bid, Some(500_000));

    // Bids during the pause bounce.
    let err = handle
        .execute(AuctionCommand::Bid {
            team_id: STRIKERS,
            amount: 550_000,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Auction(AuctionError::InvalidTransition { .. })
    ));

    handle.execute(AuctionCommand::Resume).await.unwrap();
    tokio::time::sleep(Duration::from_millis(WINDOW_MS + 1_000)).await;
    let view = wait_for(&mut sub, |v| v.stats.sold == 1).await;
    assert_eq!(
        view.teams
            .iter()
            .find(|t| t.team_id == ROYALS)
            .unwrap()
            .squad_size,
        1
    );
}

/// Disqualifying the just-sold player reverses the sale in place.
#[tokio::test(start_paused = true)]
async fn test_disqualify_after_sale() {
    let registry = AuctionRegistry::new(pavilion_service::PersistLane::disabled());
    let handle = registry.create(auction_spec(1)).unwrap();
    let mut sub = handle.subscribe();

    handle.execute(AuctionCommand::Start).await.unwrap();
    handle.execute(AuctionCommand::NextPlayer).await.unwrap();
    handle
        .execute(AuctionCommand::Bid {
            team_id: STRIKERS,
            amount: 500_000,
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(WINDOW_MS + 1_000)).await;
    wait_for(&mut sub, |v| v.stats.sold == 1).await;

    handle
        .execute(AuctionCommand::Disqualify {
            player_id: 10,
            reason: Some("eligibility protest upheld".into()),
        })
        .await
        .unwrap();
    let view = wait_for(&mut sub, |v| v.stats.sold == 0).await;
    let strikers = view.teams.iter().find(|t| t.team_id == STRIKERS).unwrap();
    assert_eq!(strikers.purse_remaining, 20_000_000);

    // Once the auction moves on, the correction window is gone.
    handle.execute(AuctionCommand::NextPlayer).await.unwrap();
    let err = handle
        .execute(AuctionCommand::Disqualify {
            player_id: 10,
            reason: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Auction(AuctionError::DisqualifyWindowClosed(10))
    ));
}

/// Announcements reach subscribers without producing state versions.
#[tokio::test]
async fn test_announcements_do_not_disturb_state() {
    let registry = AuctionRegistry::new(pavilion_service::PersistLane::disabled());
    let handle = registry.create(auction_spec(1)).unwrap();
    let mut sub = handle.subscribe();

    let before = handle.snapshot().unwrap().version;
    handle
        .execute(AuctionCommand::Announce {
            message: "marquee set starts after the break".into(),
        })
        .await
        .unwrap();

    let announcement = timeout(Duration::from_secs(5), sub.next_announcement())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(announcement.message, "marquee set starts after the break");
    assert_eq!(handle.snapshot().unwrap().version, before);
}

/// Every terminal player state is reachable and the roster adds up.
#[tokio::test(start_paused = true)]
async fn test_final_accounting() {
    let registry = AuctionRegistry::new(pavilion_service::PersistLane::disabled());
    let handle = registry.create(auction_spec(1)).unwrap();
    let mut sub = handle.subscribe();

    handle.execute(AuctionCommand::Start).await.unwrap();

    // Player 10 sold to Strikers.
    handle.execute(AuctionCommand::NextPlayer).await.unwrap();
    handle
        .execute(AuctionCommand::Bid {
            team_id: STRIKERS,
            amount: 500_000,
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(WINDOW_MS + 1_000)).await;
    wait_for(&mut sub, |v| v.stats.sold == 1).await;

    // Player 11 disqualified mid-round.
    handle.execute(AuctionCommand::NextPlayer).await.unwrap();
    handle
        .execute(AuctionCommand::Disqualify {
            player_id: 11,
            reason: None,
        })
        .await
        .unwrap();

    // Player 12 unsold on a silent window.
    handle.execute(AuctionCommand::NextPlayer).await.unwrap();
    tokio::time::sleep(Duration::from_millis(WINDOW_MS + 1_000)).await;
    wait_for(&mut sub, |v| v.stats.unsold == 1).await;

    // Pool exhausted; wrap up through the trade window.
    handle.execute(AuctionCommand::NextPlayer).await.unwrap();
    wait_for(&mut sub, |v| v.status == AuctionStatus::Completed).await;
    handle.execute(AuctionCommand::OpenTradeWindow).await.unwrap();
    handle.execute(AuctionCommand::Finalize).await.unwrap();

    let view = wait_for(&mut sub, |v| v.status == AuctionStatus::Finalized).await;
    assert_eq!(view.stats.sold, 1);
    assert_eq!(view.stats.unsold, 1);
    assert_eq!(view.stats.in_pool, 0);
    let strikers = view.teams.iter().find(|t| t.team_id == STRIKERS).unwrap();
    assert_eq!(strikers.roster.len(), 1);
    assert_eq!(
        strikers.purse_total - strikers.purse_remaining,
        strikers.roster.iter().map(|s| s.price).sum::<u64>()
    );
}

/// A sold player stays sold in the snapshot even while later rounds run.
#[tokio::test(start_paused = true)]
async fn test_sold_status_visible_in_later_rounds() {
    let registry = AuctionRegistry::new(pavilion_service::PersistLane::disabled());
    let handle = registry.create(auction_spec(1)).unwrap();
    let mut sub = handle.subscribe();

    handle.execute(AuctionCommand::Start).await.unwrap();
    handle.execute(AuctionCommand::NextPlayer).await.unwrap();
    handle
        .execute(AuctionCommand::Bid {
            team_id: ROYALS,
            amount: 500_000,
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(WINDOW_MS + 1_000)).await;
    wait_for(&mut sub, |v| v.stats.sold == 1).await;

    let reply = handle.execute(AuctionCommand::NextPlayer).await.unwrap();
    let bidding = reply.view.bidding.as_ref().unwrap();
    assert_eq!(bidding.player.player_id, 11);
    assert_eq!(bidding.player.status, PlayerStatus::InBidding);

    let royals = reply.view.teams.iter().find(|t| t.team_id == ROYALS).unwrap();
    assert_eq!(royals.roster[0].player_id, 10);
    assert_eq!(royals.roster[0].price, 500_000);
}
