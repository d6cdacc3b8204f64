//! In-memory auction state.
//!
//! One [`AuctionState`] per auction, owned by a single writer. Handlers in
//! [`crate::handlers`] are the only code that mutates it once live.

use std::collections::{HashMap, VecDeque};

use pavilion_types::view::AuctionStats;
use pavilion_types::{
    Amount, AuctionConfig, AuctionSetup, AuctionStatus, BiddingRound, ConfigError,
    PlayerId, PlayerPoolEntry, PlayerStatus, TeamId, TeamState,
};

use crate::undo::UndoLedger;

/// The sale completed in the current round, kept until the next
/// `next_player` so the admin can disqualify it as an immediate correction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SaleRecord {
    pub player_id: PlayerId,
    pub team_id: TeamId,
    pub price: Amount,
}

/// Authoritative per-auction state.
#[derive(Debug)]
pub struct AuctionState {
    pub config: AuctionConfig,
    pub status: AuctionStatus,

    /// Teams by id; `team_order` preserves the configured display order.
    pub teams: HashMap<TeamId, TeamState>,
    pub team_order: Vec<TeamId>,

    /// Player pool by id; `queue` holds ids still awaiting bidding in order.
    pub players: HashMap<PlayerId, PlayerPoolEntry>,
    pub queue: VecDeque<PlayerId>,

    /// The open bidding round, if any. At most one per auction.
    pub round: Option<BiddingRound>,
    /// Number of rounds opened so far; doubles as the current round number.
    pub rounds_opened: u64,
    /// Timer generation; bumped on every arm so stale expiries are no-ops.
    pub round_epoch: u64,

    /// Disqualify-after-sale correction window; cleared by `next_player`.
    pub last_sale: Option<SaleRecord>,

    pub undo: UndoLedger,

    /// Monotonic commit counter carried on every broadcast view.
    pub version: u64,
}

impl AuctionState {
    /// Build a configured auction from its setup payload.
    pub fn from_setup(setup: AuctionSetup) -> Result<Self, ConfigError> {
        setup.config.validate()?;
        let queue = setup.queued_ids();
        let team_order = setup.teams.iter().map(|t| t.team_id).collect();
        let teams = setup.teams.into_iter().map(|t| (t.team_id, t)).collect();
        let players = setup
            .pool
            .into_iter()
            .map(|p| (p.player_id, p))
            .collect();
        Ok(Self {
            config: setup.config,
            status: AuctionStatus::Configured,
            teams,
            team_order,
            players,
            queue,
            round: None,
            rounds_opened: 0,
            round_epoch: 0,
            last_sale: None,
            undo: UndoLedger::new(),
            version: 0,
        })
    }

    pub fn team(&self, team_id: TeamId) -> Option<&TeamState> {
        self.teams.get(&team_id)
    }

    pub fn team_mut(&mut self, team_id: TeamId) -> Option<&mut TeamState> {
        self.teams.get_mut(&team_id)
    }

    pub fn player(&self, player_id: PlayerId) -> Option<&PlayerPoolEntry> {
        self.players.get(&player_id)
    }

    pub fn player_mut(&mut self, player_id: PlayerId) -> Option<&mut PlayerPoolEntry> {
        self.players.get_mut(&player_id)
    }

    /// Debit a team's purse. Returns false if the balance is insufficient;
    /// callers validate first, so a false here is a logic bug upstream.
    pub fn debit_purse(&mut self, team_id: TeamId, amount: Amount) -> bool {
        match self.teams.get_mut(&team_id) {
            Some(team) if team.purse_remaining >= amount => {
                team.purse_remaining -= amount;
                true
            }
            _ => false,
        }
    }

    /// Credit a team's purse, capped at the purse total.
    pub fn credit_purse(&mut self, team_id: TeamId, amount: Amount) -> bool {
        match self.teams.get_mut(&team_id) {
            Some(team) => {
                team.purse_remaining = team
                    .purse_remaining
                    .saturating_add(amount)
                    .min(team.purse_total);
                true
            }
            None => false,
        }
    }

    /// Pull the next queued player id, skipping anything no longer queued.
    pub fn pop_next_queued(&mut self) -> Option<PlayerId> {
        while let Some(id) = self.queue.pop_front() {
            if matches!(
                self.players.get(&id).map(|p| &p.status),
                Some(PlayerStatus::Queued)
            ) {
                return Some(id);
            }
        }
        None
    }

    /// Bump and return the timer generation for a fresh arm cycle.
    pub fn next_epoch(&mut self) -> u64 {
        self.round_epoch += 1;
        self.round_epoch
    }

    /// Pool counters for the broadcast view.
    pub fn stats(&self) -> AuctionStats {
        let mut stats = AuctionStats {
            in_pool: self.queue.len(),
            ..Default::default()
        };
        for player in self.players.values() {
            match player.status {
                PlayerStatus::Sold { .. } => stats.sold += 1,
                PlayerStatus::Unsold => stats.unsold += 1,
                _ => {}
            }
        }
        stats
    }
}
