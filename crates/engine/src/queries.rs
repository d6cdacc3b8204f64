//! Read-only view construction.
//!
//! [`build_view`] renders the authoritative state into the snapshot fanned
//! out to subscribers and returned by the query RPCs. Views are plain data;
//! they never borrow from the state.

use pavilion_types::view::{AuctionView, BiddingView, PlayerView, TeamView};
use pavilion_types::PlayerStatus;

use crate::state::AuctionState;

/// Render the full broadcast snapshot for the current state.
pub fn build_view(state: &AuctionState) -> AuctionView {
    let teams = state
        .team_order
        .iter()
        .filter_map(|id| state.teams.get(id))
        .map(|team| TeamView {
            team_id: team.team_id,
            name: team.name.clone(),
            purse_remaining: team.purse_remaining,
            purse_total: team.purse_total,
            squad_size: team.squad_size(),
            roster: team.roster.clone(),
        })
        .collect();

    let bidding = state.round.as_ref().map(|round| {
        let player = state
            .player(round.player_id)
            .map(|p| PlayerView {
                player_id: p.player_id,
                name: p.name.clone(),
                status: p.status.clone(),
            })
            .unwrap_or(PlayerView {
                player_id: round.player_id,
                name: String::new(),
                status: PlayerStatus::InBidding,
            });
        BiddingView {
            player,
            current_bid: round.current_bid,
            current_bid_team_id: round.leading_team,
            timer_expires_at_ms: round.expires_at_ms,
            bid_history: round.history.clone(),
        }
    });

    AuctionView {
        auction_id: state.config.auction_id,
        status: state.status,
        version: state.version,
        current_round: state.round.as_ref().map(|r| r.round_no),
        teams,
        bidding,
        stats: state.stats(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::AuctionCommand;
    use crate::handlers::apply;
    use pavilion_types::{
        AuctionConfig, AuctionSetup, AuctionStatus, IncrementSchedule, PlayerPoolEntry,
        ResumePolicy, TeamState,
    };

    fn state() -> AuctionState {
        AuctionState::from_setup(AuctionSetup {
            config: AuctionConfig {
                auction_id: 7,
                name: "view test".into(),
                base_price: 500_000,
                squad_min: 1,
                squad_max: 5,
                increments: IncrementSchedule::preset("standard").unwrap(),
                bid_window_ms: 30_000,
                resume_policy: ResumePolicy::default(),
            },
            teams: vec![
                TeamState::new(2, "Royals", 10_000_000, vec![]).unwrap(),
                TeamState::new(1, "Strikers", 10_000_000, vec![]).unwrap(),
            ],
            pool: vec![PlayerPoolEntry::queued(10, "Opener")],
        })
        .unwrap()
    }

    #[test]
    fn test_view_preserves_team_order() {
        let view = build_view(&state());
        assert_eq!(view.auction_id, 7);
        assert_eq!(view.status, AuctionStatus::Configured);
        let ids: Vec<_> = view.teams.iter().map(|t| t.team_id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert!(view.bidding.is_none());
    }

    #[test]
    fn test_view_carries_open_round() {
        let mut state = state();
        apply(&mut state, 0, AuctionCommand::Start).unwrap();
        apply(&mut state, 0, AuctionCommand::NextPlayer).unwrap();
        apply(
            &mut state,
            1_000,
            AuctionCommand::Bid {
                team_id: 1,
                amount: 500_000,
            },
        )
        .unwrap();

        let view = build_view(&state);
        assert_eq!(view.current_round, Some(1));
        let bidding = view.bidding.unwrap();
        assert_eq!(bidding.player.player_id, 10);
        assert_eq!(bidding.current_bid, Some(500_000));
        assert_eq!(bidding.current_bid_team_id, Some(1));
        assert_eq!(bidding.timer_expires_at_ms, 31_000);
        assert_eq!(bidding.bid_history.len(), 1);
        assert_eq!(view.version, state.version);
    }
}
