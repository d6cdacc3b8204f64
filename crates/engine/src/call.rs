//! Command types for the auction engine.
//!
//! Every mutation of a live auction, including timer expiry, arrives as one
//! of these commands through the auction's single serialized queue.

use serde::{Deserialize, Serialize};

use pavilion_types::{Amount, PlayerId, TeamId};

/// Commands accepted by the per-auction writer.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum AuctionCommand {
    // === Admin lifecycle ===
    /// configured -> live.
    Start,

    /// live -> paused; cancels the round timer, freezes bid acceptance.
    Pause { reason: Option<String> },

    /// paused -> live; re-arms the timer per the configured resume policy.
    Resume,

    /// Advance the pool cursor and open a round for the next queued player.
    NextPlayer,

    /// Force the current round to unsold before any bid has been accepted.
    Skip,

    /// Remove the in-bidding player, or the player sold in the current round
    /// before any subsequent `NextPlayer`.
    Disqualify {
        player_id: PlayerId,
        reason: Option<String>,
    },

    /// Pop the most recent undo entry and replay its inverse.
    Undo,

    /// Force live/paused -> completed.
    Complete { reason: Option<String> },

    /// Broadcast-only admin message; no state mutation.
    Announce { message: String },

    // === Post-auction housekeeping ===
    /// completed -> trade_window.
    OpenTradeWindow,

    /// trade_window -> finalized.
    Finalize,

    // === Team ===
    /// Bid from an authenticated team client.
    Bid { team_id: TeamId, amount: Amount },

    // === Internal ===
    /// Round timer expiry, injected into the same serialized queue as every
    /// other command. A stale epoch is ignored as a no-op.
    TimerElapsed { epoch: u64 },
}

impl AuctionCommand {
    /// Short name used in errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause { .. } => "pause",
            Self::Resume => "resume",
            Self::NextPlayer => "next_player",
            Self::Skip => "skip",
            Self::Disqualify { .. } => "disqualify",
            Self::Undo => "undo",
            Self::Complete { .. } => "complete",
            Self::Announce { .. } => "announce",
            Self::OpenTradeWindow => "open_trade_window",
            Self::Finalize => "finalize",
            Self::Bid { .. } => "bid",
            Self::TimerElapsed { .. } => "timer_elapsed",
        }
    }
}
