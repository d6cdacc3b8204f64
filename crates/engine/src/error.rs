//! Auction engine error types.

use thiserror::Error;

use pavilion_types::{Amount, AuctionStatus, PlayerId, TeamId};

/// Errors that can occur while applying a command to an auction.
///
/// All of these are local and non-fatal: the auction continues in its last
/// valid state and the rejection is reported to the submitter only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuctionError {
    #[error("Command '{command}' is not valid while auction is {status:?}")]
    InvalidTransition {
        command: &'static str,
        status: AuctionStatus,
    },

    #[error("A bidding round is already open")]
    RoundAlreadyOpen,

    #[error("Round closed: no active bidding round")]
    RoundClosed,

    #[error("Player not found: {0}")]
    PlayerNotFound(PlayerId),

    #[error("Team not found: {0}")]
    TeamNotFound(TeamId),

    #[error("Team {0} already holds the leading bid")]
    SelfRaise(TeamId),

    #[error("Opening bid must equal the base price of {base}")]
    OpeningBidMismatch { base: Amount },

    #[error("Bid must equal current highest plus increment: required {required}")]
    WrongIncrement { required: Amount },

    #[error(
        "Purse reservation violated for team {team_id}: needs {required} to complete a legal squad, has {available}"
    )]
    PurseReservationViolated {
        team_id: TeamId,
        required: Amount,
        available: Amount,
    },

    #[error("Team {team_id} roster is already at the squad maximum of {max}")]
    RosterFull { team_id: TeamId, max: usize },

    #[error("Cannot skip a round once a bid has been accepted")]
    SkipAfterBid,

    #[error("Player {0} is outside the disqualification window")]
    DisqualifyWindowClosed(PlayerId),

    #[error("Nothing to undo")]
    UndoUnavailable,

    #[error("Undo limit reached: at most {0} consecutive undos")]
    UndoLimitReached(u8),
}
