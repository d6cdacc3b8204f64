//! Bounded undo ledger.
//!
//! Each undoable action is committed as a forward operation plus a
//! precomputed inverse snapshot pushed here. The stack is capped at
//! [`UNDO_DEPTH`]; pushing beyond that evicts the oldest entry. Undos may be
//! issued at most [`MAX_CONSECUTIVE_UNDOS`] times back-to-back; any committed
//! non-undo state-changing action resets that counter without clearing the
//! stack.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use pavilion_types::{Amount, PlayerId, TeamId};

/// Maximum number of inverse snapshots retained.
pub const UNDO_DEPTH: usize = 3;

/// Maximum undos issued back-to-back without an intervening action.
pub const MAX_CONSECUTIVE_UNDOS: u8 = 3;

/// Inverse snapshot of one committed state-changing resolution.
///
/// Plain bid increments are not individually undoable and never appear here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UndoEntry {
    /// A sold resolution: undo credits the purse back, removes the roster
    /// slot and returns the player to the front of the pool.
    Sold {
        player_id: PlayerId,
        team_id: TeamId,
        price: Amount,
    },

    /// An unsold resolution: undo returns the player to the front of the pool.
    Unsold { player_id: PlayerId },

    /// Disqualification of the in-bidding player: undo returns the player to
    /// the front of the pool (no purse was ever debited).
    Disqualified { player_id: PlayerId },

    /// Disqualification that reached back to a just-completed sale: undo
    /// restores the sale, re-debiting the purse and roster slot.
    DisqualifiedAfterSale {
        player_id: PlayerId,
        team_id: TeamId,
        price: Amount,
    },
}

impl UndoEntry {
    /// Human-readable description of the action this entry reverses,
    /// returned to the admin in the undo reply.
    pub fn description(&self) -> String {
        match self {
            Self::Sold {
                player_id,
                team_id,
                price,
            } => format!("sale of player {player_id} to team {team_id} for {price}"),
            Self::Unsold { player_id } => format!("unsold resolution of player {player_id}"),
            Self::Disqualified { player_id } => {
                format!("disqualification of player {player_id}")
            }
            Self::DisqualifiedAfterSale {
                player_id,
                team_id,
                price,
            } => format!(
                "post-sale disqualification of player {player_id} (sold to team {team_id} for {price})"
            ),
        }
    }
}

/// Bounded stack of inverse snapshots plus the consecutive-undo counter.
#[derive(Clone, Debug, Default)]
pub struct UndoLedger {
    entries: VecDeque<UndoEntry>,
    consecutive_undos: u8,
}

impl UndoLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a forward undoable action, evicting the oldest entry when full.
    pub fn push(&mut self, entry: UndoEntry) {
        if self.entries.len() == UNDO_DEPTH {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Pop the most recent inverse snapshot.
    pub fn pop(&mut self) -> Option<UndoEntry> {
        self.entries.pop_back()
    }

    /// Whether the consecutive-undo cap has been hit.
    pub fn at_consecutive_limit(&self) -> bool {
        self.consecutive_undos >= MAX_CONSECUTIVE_UNDOS
    }

    /// Record that an undo was applied.
    pub fn note_undo(&mut self) {
        self.consecutive_undos = self.consecutive_undos.saturating_add(1);
    }

    /// Record a committed non-undo state-changing action. Resets the
    /// consecutive counter; the stack itself is preserved.
    pub fn note_forward_action(&mut self) {
        self.consecutive_undos = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
