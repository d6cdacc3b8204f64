//! Bid validation.
//!
//! Pure functions: given the auction config, a team's purse/roster state and
//! a proposed bid, decide accept/reject. No I/O, no mutation. The caller (the
//! per-auction writer) guarantees no other bid is evaluated against a stale
//! highest-bid value.

use pavilion_types::{Amount, AuctionConfig, BiddingRound, TeamId, TeamState};

use crate::error::AuctionError;

/// The exact amount the next accepted bid must carry: the base price when the
/// round has no bid yet, otherwise current highest plus the band increment.
pub fn required_amount(config: &AuctionConfig, round: &BiddingRound) -> Amount {
    match round.current_bid {
        Some(current) => current.saturating_add(config.increments.step_at(current)),
        None => config.base_price,
    }
}

/// Purse the team must still hold after provisionally committing `amount`:
/// one base price per mandatory roster slot left open if it wins this player.
pub fn reservation_floor(config: &AuctionConfig, team: &TeamState) -> Amount {
    let slots_after_win = config.squad_min.saturating_sub(team.squad_size() + 1);
    (slots_after_win as Amount).saturating_mul(config.base_price)
}

/// Validate a proposed bid against an open round.
pub fn validate_bid(
    config: &AuctionConfig,
    team: &TeamState,
    round: &BiddingRound,
    team_id: TeamId,
    amount: Amount,
) -> Result<(), AuctionError> {
    // No self-raise.
    if round.leading_team == Some(team_id) {
        return Err(AuctionError::SelfRaise(team_id));
    }

    // The increment schedule is a step function; bids must land exactly on it.
    let required = required_amount(config, round);
    if amount != required {
        return match round.current_bid {
            Some(_) => Err(AuctionError::WrongIncrement { required }),
            None => Err(AuctionError::OpeningBidMismatch {
                base: config.base_price,
            }),
        };
    }

    // Roster must have room for one more player.
    if team.squad_size() >= config.squad_max {
        return Err(AuctionError::RosterFull {
            team_id,
            max: config.squad_max,
        });
    }

    // Purse-reservation invariant: winning at this amount must leave enough
    // to fill every remaining mandatory squad slot at base price.
    let floor = reservation_floor(config, team);
    let required_purse = amount.saturating_add(floor);
    if team.purse_remaining < required_purse {
        return Err(AuctionError::PurseReservationViolated {
            team_id,
            required: required_purse,
            available: team.purse_remaining,
        });
    }

    Ok(())
}
