//! Broadcast view shapes.
//!
//! Every committed transition fans out the full current auction view, never a
//! diff. Views are immutable snapshots; subscribers must not treat them as
//! shared mutable state.

use serde::{Deserialize, Serialize};

use crate::{
    Amount, AuctionId, AuctionStatus, BidRecord, Millis, PlayerId, PlayerStatus, RosterSlot,
    TeamId,
};

/// Counts over the player pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionStats {
    /// Players still queued for bidding.
    pub in_pool: usize,
    pub sold: usize,
    pub unsold: usize,
}

/// A team as seen by observers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamView {
    pub team_id: TeamId,
    pub name: String,
    pub purse_total: Amount,
    pub purse_remaining: Amount,
    pub roster: Vec<RosterSlot>,
    pub squad_size: usize,
}

/// The player currently under the hammer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub player_id: PlayerId,
    pub name: String,
    pub status: PlayerStatus,
}

/// The open bidding round as seen by observers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiddingView {
    pub player: PlayerView,
    pub current_bid: Option<Amount>,
    pub current_bid_team_id: Option<TeamId>,
    pub timer_expires_at_ms: Millis,
    pub bid_history: Vec<BidRecord>,
}

/// Full auction view-state delivered to every subscriber after each commit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuctionView {
    pub auction_id: AuctionId,
    pub status: AuctionStatus,
    /// Monotonic commit counter; lets a late joiner dedupe its snapshot
    /// against the transition stream.
    pub version: u64,
    /// Round number of the open round, if one is in progress.
    pub current_round: Option<u64>,
    pub teams: Vec<TeamView>,
    pub bidding: Option<BiddingView>,
    pub stats: AuctionStats,
}

/// An admin-authored message carried on the low-volume announce channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub auction_id: AuctionId,
    pub message: String,
    pub timestamp_ms: Millis,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_serializes_with_null_bidding() {
        let view = AuctionView {
            auction_id: 7,
            status: AuctionStatus::Live,
            version: 3,
            current_round: None,
            teams: vec![],
            bidding: None,
            stats: AuctionStats {
                in_pool: 10,
                sold: 2,
                unsold: 1,
            },
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "live");
        assert!(json["bidding"].is_null());
        assert_eq!(json["stats"]["in_pool"], 10);
    }
}
